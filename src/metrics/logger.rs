// Metrics logger

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use super::types::RunMetric;
use crate::pipeline::RunStatus;

pub struct MetricsLogger {
    metrics_dir: PathBuf,
}

impl MetricsLogger {
    pub fn new(metrics_dir: PathBuf) -> Result<Self> {
        // Create metrics directory if it doesn't exist
        fs::create_dir_all(&metrics_dir).with_context(|| {
            format!(
                "Failed to create metrics directory: {}",
                metrics_dir.display()
            )
        })?;

        Ok(Self { metrics_dir })
    }

    /// Log a run metric to today's JSONL file
    pub fn log(&self, metric: &RunMetric) -> Result<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let log_file = self.metrics_dir.join(format!("{}.jsonl", today));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to open metrics log: {}", log_file.display()))?;

        let json = serde_json::to_string(metric).context("Failed to serialize metric")?;

        writeln!(file, "{}", json).context("Failed to write metric to log")?;

        Ok(())
    }

    /// Hash methodology text for privacy (SHA256)
    pub fn hash_input(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Read metrics for a specific date
    pub fn read_metrics(&self, date: &str) -> Result<Vec<RunMetric>> {
        let log_file = self.metrics_dir.join(format!("{}.jsonl", date));

        if !log_file.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&log_file)
            .with_context(|| format!("Failed to read metrics log: {}", log_file.display()))?;

        let metrics: Vec<RunMetric> = contents
            .lines()
            .filter(|line| !line.is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to parse metrics")?;

        Ok(metrics)
    }

    /// Get summary statistics for today
    pub fn get_today_summary(&self) -> Result<MetricsSummary> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        Ok(MetricsSummary::from_metrics(&self.read_metrics(&today)?))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct MetricsSummary {
    pub total: usize,
    pub accepted: usize,
    /// Accepted on primary dimensions with a secondary miss
    pub primary_only: usize,
    pub capped: usize,
    pub failed: usize,
    pub avg_iterations: f64,
    pub avg_elapsed_ms: u64,
    /// Most frequent failure kinds, most common first
    pub top_errors: Vec<(String, usize)>,
}

impl MetricsSummary {
    pub fn from_metrics(metrics: &[RunMetric]) -> Self {
        let total = metrics.len();
        if total == 0 {
            return Self::default();
        }
        let count = |status: RunStatus| metrics.iter().filter(|m| m.status == status).count();

        let mut error_counts: HashMap<String, usize> = HashMap::new();
        for kind in metrics.iter().filter_map(|m| m.error_kind.as_ref()) {
            *error_counts.entry(kind.clone()).or_insert(0) += 1;
        }
        let mut top_errors: Vec<(String, usize)> = error_counts.into_iter().collect();
        top_errors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_errors.truncate(3);

        Self {
            total,
            accepted: count(RunStatus::Accepted),
            primary_only: count(RunStatus::PrimaryAccept),
            capped: count(RunStatus::CappedAccept),
            failed: count(RunStatus::Failed),
            avg_iterations: metrics.iter().map(|m| m.iterations as f64).sum::<f64>() / total as f64,
            avg_elapsed_ms: metrics.iter().map(|m| m.elapsed_ms).sum::<u64>() / total as u64,
            top_errors,
        }
    }

    /// Text report for the `metrics` command.
    pub fn format(&self) -> String {
        let pct = |n: usize| {
            if self.total > 0 {
                (n as f64 / self.total as f64) * 100.0
            } else {
                0.0
            }
        };

        let mut output = format!(
            "Metrics (today):\n\
            Total runs: {}\n\
            Accepted: {} ({:.1}%)\n\
            Primary-only accept: {} ({:.1}%)\n\
            Capped accept: {} ({:.1}%)\n\
            Failed: {} ({:.1}%)\n\
            Avg iterations: {:.2}\n\
            Avg run time: {}ms\n",
            self.total,
            self.accepted,
            pct(self.accepted),
            self.primary_only,
            pct(self.primary_only),
            self.capped,
            pct(self.capped),
            self.failed,
            pct(self.failed),
            self.avg_iterations,
            self.avg_elapsed_ms
        );

        if !self.top_errors.is_empty() {
            output.push_str("\nTop errors:\n");
            for (i, (kind, count)) in self.top_errors.iter().enumerate() {
                output.push_str(&format!("  {}. {} ({} runs)\n", i + 1, kind, count));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(status: RunStatus, iterations: u32, error: Option<&str>) -> RunMetric {
        RunMetric {
            timestamp: Utc::now(),
            run_id: "r".into(),
            input_hash: MetricsLogger::hash_input("text"),
            mode: "diagram".into(),
            status,
            iterations,
            final_scores: None,
            error_kind: error.map(str::to_string),
            elapsed_ms: 100,
        }
    }

    #[test]
    fn test_hash_input() {
        let hash1 = MetricsLogger::hash_input("Hello");
        let hash2 = MetricsLogger::hash_input("Hello");
        let hash3 = MetricsLogger::hash_input("World");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64); // SHA256 produces 64 hex chars
    }

    #[test]
    fn test_log_and_summarise_today() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path().join("metrics")).unwrap();
        logger.log(&metric(RunStatus::Accepted, 1, None)).unwrap();
        logger.log(&metric(RunStatus::CappedAccept, 3, None)).unwrap();
        logger.log(&metric(RunStatus::PrimaryAccept, 1, None)).unwrap();
        logger
            .log(&metric(RunStatus::Failed, 0, Some("contract_violation")))
            .unwrap();

        let summary = logger.get_today_summary().unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(
            (summary.accepted, summary.primary_only, summary.capped, summary.failed),
            (1, 1, 1, 1)
        );
        assert!((summary.avg_iterations - 5.0 / 4.0).abs() < 1e-9);
        assert_eq!(summary.top_errors, vec![("contract_violation".to_string(), 1)]);
    }

    #[test]
    fn test_format_summary() {
        let summary = MetricsSummary::from_metrics(&[
            metric(RunStatus::Accepted, 1, None),
            metric(RunStatus::Failed, 2, Some("timeout")),
        ]);
        let text = summary.format();
        assert!(text.contains("Total runs: 2"));
        assert!(text.contains("Accepted: 1 (50.0%)"));
        assert!(text.contains("Primary-only accept: 0 (0.0%)"));
        assert!(text.contains("  1. timeout (1 runs)"));

        let empty = MetricsSummary::default().format();
        assert!(empty.contains("Total runs: 0"));
        assert!(!empty.contains("Top errors"));
    }

    #[test]
    fn test_missing_day_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path().to_path_buf()).unwrap();
        assert!(logger.read_metrics("1999-01-01").unwrap().is_empty());
        assert_eq!(MetricsSummary::from_metrics(&[]), MetricsSummary::default());
    }
}
