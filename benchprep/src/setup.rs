//! Pre-dispatch setup: output directories and toolchain provisioning.
//!
//! Any error here aborts the run before a single project is scheduled.

use anyhow::{Result, bail};
use tracing::{info, instrument};

use crate::io::config::BenchConfig;
use crate::io::layout::{Layout, ensure_dir};
use crate::io::process::StepInvoker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupOptions {
    /// Skip `build-info/` and toolchain provisioning.
    pub no_build: bool,
}

#[instrument(skip_all, fields(no_build = options.no_build))]
pub fn prepare<I: StepInvoker>(
    layout: &Layout,
    config: &BenchConfig,
    invoker: &I,
    options: SetupOptions,
) -> Result<()> {
    if !options.no_build {
        ensure_dir(&layout.build_info_dir())?;
    }
    ensure_dir(&layout.sources_dir())?;

    if options.no_build {
        return Ok(());
    }

    let root = layout.root.display().to_string();
    let commands = config.setup.render_all(&[("root", root.as_str())])?;
    for command in commands {
        let command = command.current_dir(&layout.root);
        println!("====== Setting up toolchain: {} ======", command.display());
        let output = match invoker.invoke(&command) {
            Ok(output) => output,
            Err(err) => bail!("toolchain setup `{}` failed: {err}", command.display()),
        };
        if output.timed_out {
            bail!("toolchain setup `{}` timed out", command.display());
        }
        if !output.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "toolchain setup `{}` failed with exit status {:?}: {}",
                command.display(),
                output.exit_code,
                stderr.trim()
            );
        }
        info!(command = %command.display(), "toolchain step complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedInvoker, TestRoot};

    #[test]
    fn creates_directories_and_provisions_toolchain() {
        let root = TestRoot::new().expect("root");
        let invoker = ScriptedInvoker::new();
        prepare(
            &root.layout,
            &BenchConfig::default(),
            &invoker,
            SetupOptions { no_build: false },
        )
        .expect("prepare");

        assert!(root.layout.build_info_dir().is_dir());
        assert!(root.layout.sources_dir().is_dir());
        assert_eq!(invoker.count_matching("setup_jdk.py"), 1);
        assert_eq!(invoker.count_matching("setup_mvn.py"), 1);
    }

    #[test]
    fn no_build_skips_provisioning_and_build_info() {
        let root = TestRoot::new().expect("root");
        let invoker = ScriptedInvoker::new();
        prepare(
            &root.layout,
            &BenchConfig::default(),
            &invoker,
            SetupOptions { no_build: true },
        )
        .expect("prepare");

        assert!(!root.layout.build_info_dir().exists());
        assert!(root.layout.sources_dir().is_dir());
        assert!(invoker.calls().is_empty());
    }

    #[test]
    fn failed_provisioning_aborts_before_later_steps() {
        let root = TestRoot::new().expect("root");
        let invoker = ScriptedInvoker::new().fail_exit(&["setup_jdk.py"], 1);
        let err = prepare(
            &root.layout,
            &BenchConfig::default(),
            &invoker,
            SetupOptions { no_build: false },
        )
        .expect_err("setup should fail");

        assert!(err.to_string().contains("setup_jdk.py"));
        assert_eq!(invoker.count_matching("setup_mvn.py"), 0);
    }

    #[test]
    fn existing_directories_are_fine() {
        let root = TestRoot::new().expect("root");
        let invoker = ScriptedInvoker::new();
        let options = SetupOptions { no_build: true };
        prepare(&root.layout, &BenchConfig::default(), &invoker, options).expect("first");
        prepare(&root.layout, &BenchConfig::default(), &invoker, options).expect("second");
    }
}
