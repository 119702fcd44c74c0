//! Integration tests for telemetry initialization and span helpers.

use uuid::Uuid;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // Using try_init() in the implementation avoids panics if another
    // test already initialized a subscriber.
    let config = tradewind_worker::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "tradewind-test".to_string(),
    };
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    let _guard = tradewind_worker::telemetry::init_telemetry(config);
}

#[test]
fn work_span_creates_and_records_transitions() {
    let span = tradewind_worker::telemetry::work::start_work_span("HEARTBEAT", &Uuid::new_v4());
    tradewind_worker::telemetry::work::record_status_transition(&span, "new", "allocated");
    tradewind_worker::telemetry::work::record_status_transition(&span, "allocated", "success");
}
