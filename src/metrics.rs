use std::time::Duration;

use ::metrics::{counter, histogram};

/// Metric names
pub const DELIVERIES_TOTAL: &str = "lead_feed_deliveries_total";
pub const DELIVERY_DURATION: &str = "lead_feed_delivery_duration_seconds";
pub const CREDENTIAL_TESTS_TOTAL: &str = "lead_feed_credential_tests_total";
pub const SKIPPED_TOTAL: &str = "lead_feed_skipped_total";
pub const ERRORS_TOTAL: &str = "lead_feed_errors_total";

/// Record one delivery attempt
pub fn record_delivery(outcome: &'static str, duration: Duration) {
    counter!(DELIVERIES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(DELIVERY_DURATION, "outcome" => outcome).record(duration.as_secs_f64());
}

/// Record one credential test
pub fn record_credential_test(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!(CREDENTIAL_TESTS_TOTAL, "result" => result).increment(1);
}

/// Record a submission that was not fed
pub fn record_skip(reason: &'static str) {
    counter!(SKIPPED_TOTAL, "reason" => reason).increment(1);
}

/// Record error metrics
pub fn record_error(error_type: &'static str, operation: &'static str) {
    counter!(ERRORS_TOTAL, "type" => error_type, "operation" => operation).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_a_no_op() {
        record_delivery("delivered", Duration::from_millis(5));
        record_credential_test(false);
        record_skip("no_mapping");
        record_error("database", "append_log");
    }
}
