//! Observability for the executor
//!
//! Counters and histograms recorded while bundles are evaluated and committed.
//! Logs go through `tracing` directly.

pub mod metrics;

pub use metrics::{Counter, ExecutorMetrics, Histogram};
