// Tracing setup shared by the binaries
// Logs go to stderr only; stdout is reserved for command output and JSON

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `POMO_LOG=pomo_lib=debug`
pub const LOG_ENV: &str = "POMO_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber; later calls are ignored
pub fn init() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
