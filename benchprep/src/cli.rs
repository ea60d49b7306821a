//! CLI command implementations.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use benchprep::core::catalog::{FilterSpec, ProjectRecord};
use benchprep::core::summary::aggregate;
use benchprep::io::config::{BenchConfig, CONFIG_FILE, load_config};
use benchprep::io::layout::Layout;
use benchprep::io::process::ProcessInvoker;
use benchprep::io::run_record::{RunRecord, write_run_record};
use benchprep::pipeline::{Pipeline, PipelinePlan};
use benchprep::select::select_projects;
use benchprep::setup::{SetupOptions, prepare};

/// Resolved root, configuration and pool size for one invocation.
pub struct RunContext {
    pub layout: Layout,
    pub config: BenchConfig,
    pub workers: usize,
}

impl RunContext {
    pub fn load(
        root: Option<PathBuf>,
        config_path: Option<PathBuf>,
        workers: Option<NonZeroUsize>,
    ) -> Result<Self> {
        let root = match root {
            Some(root) => root,
            None => std::env::current_dir().context("resolve current directory")?,
        };
        let root = std::path::absolute(&root)
            .with_context(|| format!("resolve root {}", root.display()))?;
        let config_path = config_path.unwrap_or_else(|| root.join(CONFIG_FILE));
        let config = load_config(&config_path).context("load config")?;
        let workers = workers
            .map(NonZeroUsize::get)
            .unwrap_or_else(|| config.resolved_workers());
        debug!(root = %root.display(), config = %config_path.display(), workers, "context loaded");
        Ok(Self {
            layout: Layout::new(root),
            config,
            workers,
        })
    }

    fn invoker(&self) -> ProcessInvoker {
        ProcessInvoker::new(self.config.output_limit_bytes)
    }
}

/// Print the selected slugs in catalog order.
pub fn list(ctx: &RunContext, spec: &FilterSpec) -> Result<()> {
    for project in select_projects(&ctx.layout, &ctx.config, spec)? {
        println!("{}", project.slug);
    }
    Ok(())
}

pub fn fetch_build(
    ctx: &RunContext,
    spec: &FilterSpec,
    no_build: bool,
    summary_json: Option<&Path>,
) -> Result<()> {
    let projects = select_projects(&ctx.layout, &ctx.config, spec)?;
    let invoker = ctx.invoker();
    prepare(
        &ctx.layout,
        &ctx.config,
        &invoker,
        SetupOptions { no_build },
    )
    .context("setup")?;

    if no_build {
        println!("====== Fetching Repositories ======");
    } else {
        println!("====== Fetching and Building Repositories ======");
    }
    let plan = PipelinePlan::fetch_build(no_build);
    run_pipeline(ctx, &invoker, plan, &projects, summary_json);
    Ok(())
}

pub fn analyze(ctx: &RunContext, spec: &FilterSpec, summary_json: Option<&Path>) -> Result<()> {
    let projects = select_projects(&ctx.layout, &ctx.config, spec)?;
    println!("====== Analyzing Repositories ======");
    let invoker = ctx.invoker();
    run_pipeline(ctx, &invoker, PipelinePlan::analyze(), &projects, summary_json);
    Ok(())
}

/// Dispatch, wait for every task, then summarize.
///
/// Nothing after dispatch can fail the process.
fn run_pipeline(
    ctx: &RunContext,
    invoker: &ProcessInvoker,
    plan: PipelinePlan,
    projects: &[ProjectRecord],
    summary_json: Option<&Path>,
) {
    let started_at = Utc::now();
    let pipeline = Pipeline::new(&ctx.layout, &ctx.config, invoker, plan);
    let reports = pipeline.run(projects, ctx.workers);
    let finished_at = Utc::now();

    let summary = aggregate(reports.iter().map(|report| &report.outcome));
    for line in summary.render() {
        println!("{line}");
    }
    info!(
        pipeline = plan.name(),
        total = summary.total,
        success = summary.success,
        failed = summary.failed,
        "run complete"
    );

    if let Some(path) = summary_json {
        let record = RunRecord::new(
            plan.name(),
            started_at,
            finished_at,
            ctx.workers,
            summary,
            &reports,
        );
        if let Err(err) = write_run_record(path, &record) {
            warn!(err = %format!("{err:#}"), "failed to write run summary");
            eprintln!("warning: {:#}", err);
        }
    }
}
