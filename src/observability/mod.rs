use tracing_subscriber::EnvFilter;

use crate::stream::RelayOutcome;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Log the end of a relay session, computing duration from start time.
pub fn log_relay_complete(
    request_id: uuid::Uuid,
    outcome: RelayOutcome,
    start_time: std::time::Instant,
) {
    tracing::info!(
        request_id = %request_id,
        outcome = outcome.as_str(),
        duration_ms = start_time.elapsed().as_millis() as u64,
        "relay session closed"
    );
}
