use std::time::Instant;

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

use crate::settings::LogSettings;

/// Setup logging for the engine
///
/// Installs a global `tracing` subscriber writing to stdout. The filter comes
/// from `RUST_LOG` when set and from `settings.level` otherwise. The library
/// never calls this itself; binaries, benches and tests opt in.
///
/// Fails if a global subscriber is already installed.
pub fn setup_log(settings: &LogSettings) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let timestamper = CompactTimestamp {
        start: Instant::now(),
    };

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(false)
        .with_timer(timestamper);

    Registry::default()
        .with(env_filter)
        .with(stdout_layer)
        .try_init()
}

/// Elapsed time since logging started, as `00h 00m 00s`
#[derive(Clone)]
struct CompactTimestamp {
    start: Instant,
}

impl FormatTime for CompactTimestamp {
    fn format_time(
        &self,
        w: &mut tracing_subscriber::fmt::format::Writer<'_>,
    ) -> Result<(), std::fmt::Error> {
        let elapsed = self.start.elapsed();
        let hours = elapsed.as_secs() / 3600;
        let minutes = (elapsed.as_secs() % 3600) / 60;
        let seconds = elapsed.as_secs() % 60;

        write!(w, "{:02}h {:02}m {:02}s", hours, minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_fails() {
        let settings = LogSettings::default();
        // the first call may race with other tests, the second never succeeds
        let _ = setup_log(&settings);
        assert!(setup_log(&settings).is_err());
    }
}
