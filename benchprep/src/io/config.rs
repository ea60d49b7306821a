//! Orchestrator configuration stored in `<root>/benchprep.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::StepCommand;

pub const CONFIG_FILE: &str = "benchprep.toml";

/// Orchestrator configuration (TOML).
///
/// Every field has a default matching the stock benchmark checkout, so a
/// missing file is equivalent to an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BenchConfig {
    /// Catalog CSV, relative to the run root unless absolute.
    pub catalog: PathBuf,

    /// Worker pool size. `0` uses the host's available parallelism.
    pub workers: usize,

    /// Keep at most this many bytes of each step's stdout and stderr.
    pub output_limit_bytes: usize,

    pub fetch: StepConfig,
    pub build: StepConfig,
    pub analyze: StepConfig,
    pub setup: SetupConfig,
}

/// An external step as an argv template.
///
/// Placeholders `{root}`, `{slug}`, `{artifact}` and `{output}` are expanded
/// per invocation. A stage table that omits `command` keeps the stage's
/// default command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Kill the step after this many seconds. `0` disables the timeout.
    #[serde(default)]
    pub timeout_secs: u64,
}

/// Toolchain provisioning run once before dispatch when building.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SetupConfig {
    pub commands: Vec<Vec<String>>,
    pub timeout_secs: u64,
}

fn argv(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn default_fetch_command() -> Vec<String> {
    argv(&["python", "{root}/scripts/fetch_one.py", "{slug}"])
}

fn default_build_command() -> Vec<String> {
    argv(&["python", "{root}/scripts/build_one.py", "{slug}"])
}

fn default_analyze_command() -> Vec<String> {
    argv(&["spotbugs", "{artifact}", "-output", "{output}"])
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from("data/project_info.csv"),
            workers: 0,
            output_limit_bytes: 10_000_000,
            fetch: StepConfig {
                command: Some(default_fetch_command()),
                timeout_secs: 0,
            },
            build: StepConfig {
                command: Some(default_build_command()),
                timeout_secs: 0,
            },
            analyze: StepConfig {
                command: Some(default_analyze_command()),
                timeout_secs: 0,
            },
            setup: SetupConfig::default(),
        }
    }
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            commands: vec![
                argv(&["python", "{root}/scripts/setup_jdk.py"]),
                argv(&["python", "{root}/scripts/setup_mvn.py"]),
            ],
            timeout_secs: 0,
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.catalog.as_os_str().is_empty() {
            return Err(anyhow!("catalog must be non-empty"));
        }
        validate_command("fetch.command", self.fetch.argv())?;
        validate_command("build.command", self.build.argv())?;
        validate_command("analyze.command", self.analyze.argv())?;
        for (index, command) in self.setup.commands.iter().enumerate() {
            validate_command(&format!("setup.commands[{index}]"), command)?;
        }
        Ok(())
    }

    /// Give stage tables without a `command` their stage's default.
    fn fill_stage_defaults(&mut self) {
        self.fetch.command.get_or_insert_with(default_fetch_command);
        self.build.command.get_or_insert_with(default_build_command);
        self.analyze.command.get_or_insert_with(default_analyze_command);
    }

    pub fn catalog_path(&self, root: &Path) -> PathBuf {
        root.join(&self.catalog)
    }

    /// Configured pool size, falling back to host parallelism.
    pub fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl StepConfig {
    pub fn timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.timeout_secs)
    }

    pub fn argv(&self) -> &[String] {
        self.command.as_deref().unwrap_or_default()
    }

    /// Expand the argv template into a runnable command.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<StepCommand> {
        render_command(self.argv(), vars).map(|command| command.timeout(self.timeout()))
    }
}

impl SetupConfig {
    pub fn render_all(&self, vars: &[(&str, &str)]) -> Result<Vec<StepCommand>> {
        let timeout = timeout_from_secs(self.timeout_secs);
        self.commands
            .iter()
            .map(|command| render_command(command, vars).map(|command| command.timeout(timeout)))
            .collect()
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn render_command(template: &[String], vars: &[(&str, &str)]) -> Result<StepCommand> {
    let argv = template
        .iter()
        .map(|arg| expand_placeholders(arg, vars))
        .collect();
    StepCommand::from_argv(argv).ok_or_else(|| anyhow!("command must be a non-empty array"))
}

/// Replace `{name}` with the matching value in one pass over `template`.
///
/// Substituted values are never rescanned. Unknown placeholders are left intact.
pub fn expand_placeholders(template: &str, vars: &[(&str, &str)]) -> String {
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        expanded.push_str(&rest[..open]);
        let candidate = &rest[open..];
        let value = candidate.find('}').and_then(|close| {
            let name = &candidate[1..close];
            vars.iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                expanded.push_str(value);
                rest = &candidate[close + 1..];
            }
            None => {
                expanded.push('{');
                rest = &candidate[1..];
            }
        }
    }
    expanded.push_str(rest);
    expanded
}

fn validate_command(label: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{label} must be a non-empty array"));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BenchConfig::default()`.
pub fn load_config(path: &Path) -> Result<BenchConfig> {
    if !path.exists() {
        let cfg = BenchConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut cfg: BenchConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.fill_stage_defaults();
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
