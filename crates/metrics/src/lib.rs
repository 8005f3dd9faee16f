//! Metric names and recorder setup for parley.
//!
//! Instrumented crates record through the `metrics` facade re-exported here.
//! Nothing is collected until [`init_metrics`] installs a recorder; with the
//! `prometheus` feature that recorder renders the Prometheus text format.
//!
//! ```rust,ignore
//! use parley_metrics::{broker, counter};
//!
//! counter!(broker::OUTCOMES_TOTAL, "outcome" => "connected").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
