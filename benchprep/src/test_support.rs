//! Test-only helpers: catalog records, scratch run roots, scripted step invokers.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use tempfile::TempDir;

use crate::core::catalog::ProjectRecord;
use crate::io::layout::Layout;
use crate::io::process::{StepCommand, StepError, StepInvoker, StepOutput};

/// Create a catalog record with deterministic id and CVE columns.
pub fn project(slug: &str, cwe: &str) -> ProjectRecord {
    ProjectRecord {
        id: format!("id-{slug}"),
        slug: slug.to_string(),
        cve_id: format!("CVE-0000-{slug}"),
        cwe_id: cwe.to_string(),
        extra: Vec::new(),
    }
}

/// Scratch run root backed by a temp directory.
pub struct TestRoot {
    pub dir: TempDir,
    pub layout: Layout,
}

impl TestRoot {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let layout = Layout::new(dir.path());
        Ok(Self { dir, layout })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `data/project_info.csv` with `(slug, cwe)` rows.
    pub fn write_catalog(&self, rows: &[(&str, &str)]) -> std::io::Result<()> {
        let mut contents = String::from("ID,project_slug,cve_id,cwe_id,cwe_name\n");
        for (index, (slug, cwe)) in rows.iter().enumerate() {
            contents.push_str(&format!(
                "{},{slug},CVE-0000-{index},{cwe},\"name, with comma\"\n",
                index + 1
            ));
        }
        let data = self.path().join("data");
        fs::create_dir_all(&data)?;
        fs::write(data.join("project_info.csv"), contents)
    }

    /// Create an empty `target/` directory for `slug`.
    pub fn make_target(&self, slug: &str) -> std::io::Result<()> {
        fs::create_dir_all(self.layout.target_dir(slug))
    }

    /// Drop a fake build artifact into `target/`.
    pub fn add_artifact(&self, slug: &str, name: &str) -> std::io::Result<()> {
        self.make_target(slug)?;
        fs::write(self.layout.target_dir(slug).join(name), b"PK")
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Exit(i32),
    Spawn,
    Timeout,
}

#[derive(Debug, Clone)]
struct Rule {
    needles: Vec<String>,
    behavior: Behavior,
}

/// Invoker that never spawns processes.
///
/// Every call is recorded. A command whose rendered argv contains all the
/// needles of a rule gets that rule's behaviour; anything else succeeds with
/// stdout `ran <argv>\n`.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    rules: Vec<Rule>,
    calls: Mutex<Vec<StepCommand>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_exit(self, needles: &[&str], code: i32) -> Self {
        self.with_rule(needles, Behavior::Exit(code))
    }

    pub fn fail_spawn(self, needles: &[&str]) -> Self {
        self.with_rule(needles, Behavior::Spawn)
    }

    pub fn time_out(self, needles: &[&str]) -> Self {
        self.with_rule(needles, Behavior::Timeout)
    }

    fn with_rule(mut self, needles: &[&str], behavior: Behavior) -> Self {
        self.rules.push(Rule {
            needles: needles.iter().map(|needle| needle.to_string()).collect(),
            behavior,
        });
        self
    }

    pub fn calls(&self) -> Vec<StepCommand> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Number of recorded calls whose argv contains `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|command| command.display().contains(needle))
            .count()
    }
}

impl StepInvoker for ScriptedInvoker {
    fn invoke(&self, command: &StepCommand) -> Result<StepOutput, StepError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(command.clone());

        let rendered = command.display();
        let behavior = self
            .rules
            .iter()
            .find(|rule| rule.needles.iter().all(|needle| rendered.contains(needle)))
            .map(|rule| rule.behavior.clone());

        match behavior {
            Some(Behavior::Spawn) => Err(StepError::Spawn {
                program: command.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted"),
            }),
            Some(Behavior::Timeout) => Ok(StepOutput {
                exit_code: None,
                timed_out: true,
                ..StepOutput::default()
            }),
            Some(Behavior::Exit(code)) => Ok(StepOutput {
                exit_code: Some(code),
                stderr: format!("scripted failure {code}\n").into_bytes(),
                ..StepOutput::default()
            }),
            None => Ok(StepOutput {
                exit_code: Some(0),
                stdout: format!("ran {rendered}\n").into_bytes(),
                ..StepOutput::default()
            }),
        }
    }
}
