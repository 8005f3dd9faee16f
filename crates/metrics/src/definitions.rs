//! Metric name and label definitions.
//!
//! Every metric parley emits is named here so dashboards have one place to
//! look.

/// Connection broker metrics
pub mod broker {
    /// Outcomes produced by broker operations, labelled by `outcome`
    pub const OUTCOMES_TOTAL: &str = "parley_broker_outcomes_total";
}

/// Channel relay metrics
pub mod relay {
    /// Inbound activities handled, labelled by `action`
    pub const ACTIVITIES_TOTAL: &str = "parley_relay_activities_total";
    /// Messages forwarded between connected parties
    pub const FORWARDED_TOTAL: &str = "parley_relay_forwarded_total";
    /// Outbound sends that failed
    pub const SEND_ERRORS_TOTAL: &str = "parley_relay_send_errors_total";
    /// Time spent forwarding one message, in seconds
    pub const FORWARD_DURATION_SECONDS: &str = "parley_relay_forward_duration_seconds";
}

/// Standard histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Forwarding duration buckets (in seconds)
    /// Covers 1ms to 30s
    pub static FORWARD_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]
    });
}
