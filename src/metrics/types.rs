// Metrics data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{RunReport, RunStatus, Scores};

/// One finished run, as appended to the daily metrics log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetric {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    /// SHA-256 of the methodology text; the text itself is never logged
    pub input_hash: String,
    pub mode: String,
    pub status: RunStatus,
    pub iterations: u32,
    pub final_scores: Option<Scores>,
    pub error_kind: Option<String>,
    pub elapsed_ms: u64,
}

impl RunMetric {
    pub fn from_report(report: &RunReport, input_hash: String) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id: report.run_id.to_string(),
            input_hash,
            mode: report.mode.to_string(),
            status: report.status,
            iterations: report.iteration_count,
            final_scores: report.final_scores,
            error_kind: report.failure.as_ref().map(|f| f.kind.to_string()),
            elapsed_ms: report.elapsed_ms,
        }
    }
}
