//! Fan-in of task outcomes into a run summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::outcome::{Stage, TaskOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of dispatched projects.
    pub total: usize,
    pub success: usize,
    pub skipped_already_done: usize,
    pub skipped_missing_prerequisite: usize,
    pub failed: usize,
    /// Breakdown of `failed` by the stage that failed.
    pub failed_by_stage: BTreeMap<Stage, usize>,
}

/// Tally every outcome into exactly one bucket.
///
/// Must be called once the pool has drained; arrival order is irrelevant.
pub fn aggregate<'a, I>(outcomes: I) -> RunSummary
where
    I: IntoIterator<Item = &'a TaskOutcome>,
{
    let mut summary = RunSummary::default();
    for outcome in outcomes {
        summary.total += 1;
        match outcome {
            TaskOutcome::Success => summary.success += 1,
            TaskOutcome::SkippedAlreadyDone => summary.skipped_already_done += 1,
            TaskOutcome::SkippedMissingPrerequisite => summary.skipped_missing_prerequisite += 1,
            TaskOutcome::Failed { stage, .. } => {
                summary.failed += 1;
                *summary.failed_by_stage.entry(*stage).or_insert(0) += 1;
            }
        }
    }
    summary
}

impl RunSummary {
    /// Operator-facing summary lines.
    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Executed: {}; Success: {}; Already done: {}; Missing prerequisite: {}; Failed: {}",
            self.total,
            self.success,
            self.skipped_already_done,
            self.skipped_missing_prerequisite,
            self.failed
        )];
        for (stage, count) in &self.failed_by_stage {
            lines.push(format!("  failed at {stage}: {count}"));
        }
        lines
    }
}
