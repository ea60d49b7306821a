//! Per-project stage sequence: fetch, build, analyze.
//!
//! Each stage is gated on the previous one. Every failure is turned into a
//! [`TaskOutcome`] here, at the task boundary, so a broken project never
//! reaches its siblings.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::core::catalog::ProjectRecord;
use crate::core::outcome::{FailureReason, Stage, TaskOutcome, TaskReport};
use crate::io::config::{BenchConfig, StepConfig};
use crate::io::layout::{Layout, write_atomic};
use crate::io::process::{StepCommand, StepError, StepInvoker, StepOutput};
use crate::pool::dispatch;

/// Which stages a run executes for every project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelinePlan {
    pub fetch: bool,
    pub build: bool,
    pub analyze: bool,
}

impl PipelinePlan {
    pub fn fetch_build(no_build: bool) -> Self {
        Self {
            fetch: true,
            build: !no_build,
            analyze: false,
        }
    }

    pub fn analyze() -> Self {
        Self {
            fetch: false,
            build: false,
            analyze: true,
        }
    }

    pub fn name(&self) -> &'static str {
        match (self.fetch, self.build, self.analyze) {
            (true, true, false) => "fetch-build",
            (true, false, false) => "fetch",
            (false, false, true) => "analyze",
            _ => "custom",
        }
    }
}

/// A stage that did not complete; converted to [`TaskOutcome::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct StageFailure {
    stage: Stage,
    reason: FailureReason,
}

impl From<StageFailure> for TaskOutcome {
    fn from(failure: StageFailure) -> Self {
        TaskOutcome::failed(failure.stage, failure.reason)
    }
}

pub struct Pipeline<'a, I: StepInvoker> {
    pub layout: &'a Layout,
    pub config: &'a BenchConfig,
    pub invoker: &'a I,
    pub plan: PipelinePlan,
}

impl<'a, I: StepInvoker> Pipeline<'a, I> {
    pub fn new(
        layout: &'a Layout,
        config: &'a BenchConfig,
        invoker: &'a I,
        plan: PipelinePlan,
    ) -> Self {
        Self {
            layout,
            config,
            invoker,
            plan,
        }
    }

    /// Process every project on a pool of `workers` threads.
    pub fn run(&self, projects: &[ProjectRecord], workers: usize) -> Vec<TaskReport> {
        info!(
            pipeline = self.plan.name(),
            projects = projects.len(),
            workers,
            "pipeline started"
        );
        dispatch(projects, workers, |project| self.run_project(project))
    }

    #[instrument(skip_all, fields(slug = %project.slug, pipeline = self.plan.name()))]
    pub fn run_project(&self, project: &ProjectRecord) -> TaskOutcome {
        let slug = project.slug.as_str();
        println!("== Processing {slug} ==");

        if self.plan.fetch
            && let Err(failure) = self.run_logged_step(Stage::Fetch, &self.config.fetch, slug)
        {
            return self.report_failure(slug, failure);
        }
        if self.plan.build
            && let Err(failure) = self.run_logged_step(Stage::Build, &self.config.build, slug)
        {
            return self.report_failure(slug, failure);
        }
        match (self.plan.fetch, self.plan.build) {
            (true, true) => println!("== Done fetching and building {slug} =="),
            (true, false) => println!("== Done fetching {slug} =="),
            (false, true) => println!("== Done building {slug} =="),
            (false, false) => {}
        }

        if !self.plan.analyze {
            return TaskOutcome::Success;
        }
        match self.analyze(slug) {
            Ok(outcome) => outcome,
            Err(failure) => self.report_failure(slug, failure),
        }
    }

    /// Run a fetch or build step and keep its output under `build-info/logs`.
    fn run_logged_step(
        &self,
        stage: Stage,
        step: &StepConfig,
        slug: &str,
    ) -> Result<(), StageFailure> {
        let command = self.render(stage, step, slug, &[])?;
        let output = self.invoke(stage, slug, &command)?;
        self.write_step_log(stage, slug, &output.combined_log());
        check_status(stage, slug, &command, &output)
    }

    fn analyze(&self, slug: &str) -> Result<TaskOutcome, StageFailure> {
        if self.layout.already_done(slug) {
            println!("  ==> Skipping {slug} since it already ran");
            return Ok(TaskOutcome::SkippedAlreadyDone);
        }
        self.layout
            .ensure_analysis_dir(slug)
            .map_err(|err| io_failure(Stage::Analyze, format!("{err:#}")))?;

        if !self.layout.has_prerequisite(slug) {
            println!("  ==> {slug}: compiled target directory not found; skipping");
            return Ok(TaskOutcome::SkippedMissingPrerequisite);
        }
        let artifacts = self
            .layout
            .artifacts(slug)
            .map_err(|err| io_failure(Stage::Analyze, err.to_string()))?;
        if artifacts.is_empty() {
            println!("  ==> {slug}: .jar files not found; skipping");
            return Ok(TaskOutcome::SkippedMissingPrerequisite);
        }

        let mut report = Vec::new();
        let mut log = Vec::new();
        for artifact in &artifacts {
            let output_path = self.layout.artifact_report_path(slug, artifact);
            let vars = [
                ("artifact", path_str(artifact)),
                ("output", path_str(&output_path)),
            ];
            let vars: Vec<(&str, &str)> = vars.iter().map(|(k, v)| (*k, v.as_str())).collect();
            let command = self.render(Stage::Analyze, &self.config.analyze, slug, &vars)?;
            let output = self.invoke(Stage::Analyze, slug, &command)?;
            log.extend_from_slice(&output.combined_log());
            if let Err(failure) = check_status(Stage::Analyze, slug, &command, &output) {
                self.write_step_log(Stage::Analyze, slug, &log);
                return Err(failure);
            }
            debug!(artifact = %artifact.display(), "artifact analyzed");
            report.extend_from_slice(&output.stdout);
        }
        self.write_step_log(Stage::Analyze, slug, &log);

        write_atomic(&self.layout.report_path(slug), &report)
            .map_err(|err| io_failure(Stage::Report, format!("{err:#}")))?;
        println!(
            "== Done analyzing {slug} ({} artifact(s)) ==",
            artifacts.len()
        );
        Ok(TaskOutcome::Success)
    }

    fn render(
        &self,
        stage: Stage,
        step: &StepConfig,
        slug: &str,
        extra: &[(&str, &str)],
    ) -> Result<StepCommand, StageFailure> {
        let root = path_str(&self.layout.root);
        let mut vars = vec![("root", root.as_str()), ("slug", slug)];
        vars.extend_from_slice(extra);
        step.render(&vars)
            .map(|command| command.current_dir(&self.layout.root))
            .map_err(|err| io_failure(stage, format!("{err:#}")))
    }

    fn invoke(
        &self,
        stage: Stage,
        slug: &str,
        command: &StepCommand,
    ) -> Result<StepOutput, StageFailure> {
        debug!(stage = %stage, command = %command.display(), "invoking step");
        self.invoker.invoke(command).map_err(|err| {
            warn!(slug, stage = %stage, err = %err, "step could not run");
            let reason = match &err {
                StepError::Spawn { .. } => FailureReason::Spawn(err.to_string()),
                _ => FailureReason::Io(err.to_string()),
            };
            StageFailure { stage, reason }
        })
    }

    fn write_step_log(&self, stage: Stage, slug: &str, contents: &[u8]) {
        let path = self.layout.step_log_path(slug, stage.as_str());
        if let Err(err) = write_atomic(&path, contents) {
            warn!(slug, stage = %stage, err = %format!("{err:#}"), "failed to write step log");
        }
    }

    fn report_failure(&self, slug: &str, failure: StageFailure) -> TaskOutcome {
        let log = self.layout.step_log_path(slug, failure.stage.as_str());
        if log.is_file() {
            println!(
                ">> {slug}: {} failed ({}); see {}",
                failure.stage,
                failure.reason,
                log.display()
            );
        } else {
            println!(">> {slug}: {} failed ({})", failure.stage, failure.reason);
        }
        failure.into()
    }
}

fn check_status(
    stage: Stage,
    slug: &str,
    command: &StepCommand,
    output: &StepOutput,
) -> Result<(), StageFailure> {
    if output.timed_out {
        let secs = command.timeout.map(|t| t.as_secs()).unwrap_or_default();
        warn!(slug, stage = %stage, timeout_secs = secs, "step timed out");
        return Err(StageFailure {
            stage,
            reason: FailureReason::Timeout(secs),
        });
    }
    if output.exit_code != Some(0) {
        warn!(slug, stage = %stage, exit_code = ?output.exit_code, command = %command.display(), "step failed");
        return Err(StageFailure {
            stage,
            reason: FailureReason::Exit(output.exit_code),
        });
    }
    Ok(())
}

fn io_failure(stage: Stage, message: String) -> StageFailure {
    StageFailure {
        stage,
        reason: FailureReason::Io(message),
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}
