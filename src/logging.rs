// ==========================================
// Logging initialisation
// ==========================================
// tracing + tracing-subscriber
// Level filter from RUST_LOG, format from PRECAST_LOG_FORMAT
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_FORMAT: &str = "PRECAST_LOG_FORMAT";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialise logging for the server binary.
///
/// # Environment
/// - RUST_LOG: level filter (default: info),
///   e.g. RUST_LOG=debug or RUST_LOG=precast_import=trace
/// - PRECAST_LOG_FORMAT=json: one JSON object per line
///
/// # Example
/// ```no_run
/// use precast_import::logging;
/// logging::init();
/// ```
pub fn init() {
    match std::env::var(ENV_LOG_FORMAT) {
        Ok(format) if format.eq_ignore_ascii_case("json") => init_json(),
        _ => {
            fmt()
                .with_env_filter(env_filter())
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .init();
        }
    }
}

/// JSON lines, for log shipping.
pub fn init_json() {
    fmt()
        .json()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_current_span(true)
        .with_line_number(true)
        .init();
}

/// Debug-level logging captured by the test harness. Safe to call repeatedly.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
