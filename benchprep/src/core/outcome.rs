use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Build,
    Analyze,
    /// Writing the aggregated analysis report.
    Report,
    /// The task crashed outside any external step.
    Worker,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Build => "build",
            Stage::Analyze => "analyze",
            Stage::Report => "report",
            Stage::Worker => "worker",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Process ran and reported failure. `None` when killed by a signal.
    Exit(Option<i32>),
    /// Process could not be started.
    Spawn(String),
    /// Process exceeded its time budget and was killed.
    Timeout(u64),
    Io(String),
    Panicked(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Exit(Some(code)) => write!(f, "exit status {code}"),
            FailureReason::Exit(None) => f.write_str("terminated by signal"),
            FailureReason::Spawn(err) => write!(f, "could not start: {err}"),
            FailureReason::Timeout(secs) => write!(f, "timed out after {secs}s"),
            FailureReason::Io(err) => write!(f, "i/o error: {err}"),
            FailureReason::Panicked(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

/// Result of processing one project. Produced exactly once per dispatched project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    SkippedAlreadyDone,
    SkippedMissingPrerequisite,
    Failed { stage: Stage, reason: FailureReason },
}

impl TaskOutcome {
    pub fn failed(stage: Stage, reason: FailureReason) -> Self {
        TaskOutcome::Failed { stage, reason }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }
}

/// Outcome of one project as reported by a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskReport {
    pub slug: String,
    pub outcome: TaskOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_renders_context() {
        assert_eq!(FailureReason::Exit(Some(2)).to_string(), "exit status 2");
        assert_eq!(FailureReason::Exit(None).to_string(), "terminated by signal");
        assert_eq!(FailureReason::Timeout(30).to_string(), "timed out after 30s");
    }

    #[test]
    fn outcome_serializes_with_stage_and_reason() {
        let outcome = TaskOutcome::failed(Stage::Build, FailureReason::Exit(Some(1)));
        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["stage"], "build");
        assert_eq!(json["reason"]["kind"], "exit");
        assert_eq!(json["reason"]["detail"], 1);
    }

    #[test]
    fn only_failed_is_failure() {
        assert!(!TaskOutcome::Success.is_failure());
        assert!(!TaskOutcome::SkippedAlreadyDone.is_failure());
        assert!(!TaskOutcome::SkippedMissingPrerequisite.is_failure());
        assert!(TaskOutcome::failed(Stage::Fetch, FailureReason::Spawn("x".into())).is_failure());
    }
}
