//! Benchmark preparation orchestrator.
//!
//! Fetches, builds, and statically analyzes every selected catalog project
//! on a bounded worker pool. Per-project failures end up in the summary; the
//! process only exits nonzero when setup fails before dispatch.

mod cli;

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Result;
use benchprep::core::catalog::FilterSpec;
use benchprep::{exit_codes, logging};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "benchprep",
    version,
    about = "Fetch, build and analyze benchmark projects in parallel"
)]
struct Cli {
    /// Benchmark checkout root (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Config file (defaults to `<root>/benchprep.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Worker pool size (defaults to the host's available parallelism).
    #[arg(long, global = true)]
    workers: Option<NonZeroUsize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default, Clone)]
struct SelectArgs {
    /// Keep projects whose slug contains any of these substrings.
    #[arg(long = "filter", num_args = 1..)]
    filter: Vec<String>,
    /// Drop projects whose slug contains any of these substrings.
    #[arg(long, num_args = 1..)]
    exclude: Vec<String>,
    /// Keep projects whose CWE id is one of these.
    #[arg(long, num_args = 1..)]
    cwe: Vec<String>,
}

impl SelectArgs {
    fn into_spec(self) -> FilterSpec {
        FilterSpec {
            include_substrings: self.filter,
            exclude_substrings: self.exclude,
            cwe_allowlist: self.cwe,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the slugs of the selected projects.
    List {
        #[command(flatten)]
        select: SelectArgs,
    },
    /// Provision the toolchain, then fetch and build every selected project.
    FetchBuild {
        /// Only fetch sources; skip toolchain setup and the build stage.
        #[arg(long)]
        no_build: bool,
        #[command(flatten)]
        select: SelectArgs,
        /// Also write the run summary as JSON to this path.
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
    /// Run static analysis over the build artifacts of every selected project.
    Analyze {
        #[command(flatten)]
        select: SelectArgs,
        /// Also write the run summary as JSON to this path.
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init();
    if let Err(err) = run(cli) {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::SETUP_FAILED);
    }
}

fn run(cli: Cli) -> Result<()> {
    let ctx = cli::RunContext::load(cli.root, cli.config, cli.workers)?;
    match cli.command {
        Command::List { select } => cli::list(&ctx, &select.into_spec()),
        Command::FetchBuild {
            no_build,
            select,
            summary_json,
        } => cli::fetch_build(&ctx, &select.into_spec(), no_build, summary_json.as_deref()),
        Command::Analyze {
            select,
            summary_json,
        } => cli::analyze(&ctx, &select.into_spec(), summary_json.as_deref()),
    }
}
