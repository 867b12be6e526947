// Metrics module
// Public interface for logging and summarising run metrics

mod logger;
mod types;

pub use logger::{MetricsLogger, MetricsSummary};
pub use types::RunMetric;
