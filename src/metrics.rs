//! Metrics instrumentation for the bootstrap sequence
//!
//! Thin wrappers over the `metrics` facade so call sites stay one-liners and
//! metric names live in one place. An exporter is the embedding
//! application's choice; without one these are no-ops.

/// Label values
pub mod labels {
    /// SCRAM-SHA-256 authentication
    pub const MECHANISM_SCRAM: &str = "scram-sha-256";
    /// Cleartext password authentication
    pub const MECHANISM_CLEARTEXT: &str = "cleartext";
}

/// Counter helpers
pub mod counters {
    use metrics::counter;

    /// A connection attempt started
    pub fn connect_attempted() {
        counter!("bootstrap_connect_attempts_total").increment(1);
    }

    /// A transient failure triggered a retry
    pub fn connect_retried() {
        counter!("bootstrap_connect_retries_total").increment(1);
    }

    /// The bootstrap sequence failed (`reason`: "fatal", "retries_exhausted")
    pub fn connect_failed(reason: &'static str) {
        counter!("bootstrap_connect_failures_total", "reason" => reason).increment(1);
    }

    /// The server requested authentication with `mechanism`
    pub fn auth_attempted(mechanism: &'static str) {
        counter!("bootstrap_auth_attempts_total", "mechanism" => mechanism).increment(1);
    }

    /// Authentication completed
    pub fn auth_successful(mechanism: &'static str) {
        counter!("bootstrap_auth_success_total", "mechanism" => mechanism).increment(1);
    }

    /// Authentication was rejected
    pub fn auth_failed(mechanism: &'static str, reason: &'static str) {
        counter!(
            "bootstrap_auth_failures_total",
            "mechanism" => mechanism,
            "reason" => reason
        )
        .increment(1);
    }
}

/// Histogram helpers
pub mod histograms {
    use metrics::histogram;

    /// Time spent in the authentication exchange
    pub fn auth_duration(mechanism: &'static str, millis: u64) {
        histogram!("bootstrap_auth_duration_ms", "mechanism" => mechanism).record(millis as f64);
    }

    /// End-to-end bootstrap duration (`outcome`: "ready", "failed")
    pub fn bootstrap_duration(outcome: &'static str, millis: u64) {
        histogram!("bootstrap_duration_ms", "outcome" => outcome).record(millis as f64);
    }
}
