//! Tracing/logging setup shared by the task binary and integration tests.

use tracing_subscriber::EnvFilter;

/// Initialize process-wide tracing/logging.
///
/// JSON logs with timestamps. Filter directives come from `RUST_LOG`; when
/// that is unset, `TENEMENT_LOG` supplies the default level (falling back to
/// `info`). Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

fn default_directive() -> String {
    std::env::var("TENEMENT_LOG").unwrap_or_else(|_| "info".to_string())
}
