//! Persisted record of a completed run.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::outcome::TaskReport;
use crate::core::summary::RunSummary;
use crate::io::layout::write_atomic;

/// Run metadata written by `--summary-json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub pipeline: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub workers: usize,
    pub summary: RunSummary,
    /// Failed projects sorted by slug.
    pub failures: Vec<TaskReport>,
}

impl RunRecord {
    pub fn new(
        pipeline: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        workers: usize,
        summary: RunSummary,
        reports: &[TaskReport],
    ) -> Self {
        let mut failures: Vec<TaskReport> = reports
            .iter()
            .filter(|report| report.outcome.is_failure())
            .cloned()
            .collect();
        failures.sort_by(|left, right| left.slug.cmp(&right.slug));
        let duration = finished_at - started_at;
        Self {
            pipeline: pipeline.to_string(),
            start_time: started_at.to_rfc3339(),
            end_time: finished_at.to_rfc3339(),
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            workers,
            summary,
            failures,
        }
    }
}

pub fn write_run_record(path: &Path, record: &RunRecord) -> Result<()> {
    let contents = serde_json::to_string_pretty(record).context("serialize run record")?;
    write_atomic(path, format!("{contents}\n").as_bytes())
        .with_context(|| format!("write run record {}", path.display()))
}
