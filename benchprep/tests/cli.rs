//! CLI tests: spawn the `benchprep` binary against scratch roots.

use std::fs;
use std::process::{Command, Output};

use benchprep::exit_codes;
use benchprep::test_support::TestRoot;

fn benchprep(root: &TestRoot, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_benchprep"))
        .arg("--root")
        .arg(root.path())
        .args(args)
        .output()
        .expect("run benchprep")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

fn scenario_root() -> TestRoot {
    let root = TestRoot::new().expect("root");
    root.write_catalog(&[("a", "89"), ("b", "79"), ("c", "89")])
        .expect("catalog");
    root
}

#[test]
fn list_filters_by_cwe() {
    let root = scenario_root();
    let output = benchprep(&root, &["list", "--cwe", "89"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout_lines(&output), vec!["a", "c"]);
}

#[test]
fn list_applies_exclude_after_cwe() {
    let root = scenario_root();
    let output = benchprep(&root, &["list", "--cwe", "89", "--exclude", "c"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout_lines(&output), vec!["a"]);
}

#[test]
fn missing_catalog_fails_setup() {
    let root = TestRoot::new().expect("root");
    let output = benchprep(&root, &["analyze"]);
    assert_eq!(output.status.code(), Some(exit_codes::SETUP_FAILED));
    assert!(String::from_utf8_lossy(&output.stderr).contains("load catalog"));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let root = scenario_root();
    let output = benchprep(&root, &["list", "--bogus"]);
    assert_eq!(output.status.code(), Some(exit_codes::USAGE));
}

#[test]
fn analyze_without_build_output_reports_skips() {
    let root = scenario_root();
    let summary_path = root.path().join("out/summary.json");
    let output = benchprep(
        &root,
        &[
            "analyze",
            "--workers",
            "2",
            "--summary-json",
            summary_path.to_str().expect("utf-8 path"),
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let lines = stdout_lines(&output);
    assert!(lines.contains(
        &"Executed: 3; Success: 0; Already done: 0; Missing prerequisite: 3; Failed: 0".to_string()
    ));

    let record: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&summary_path).expect("summary")).expect("json");
    assert_eq!(record["pipeline"], "analyze");
    assert_eq!(record["summary"]["total"], 3);
    assert_eq!(record["summary"]["skipped_missing_prerequisite"], 3);
}

#[test]
fn per_project_failures_do_not_change_exit_code() {
    let root = scenario_root();
    fs::write(
        root.path().join("benchprep.toml"),
        "[fetch]\ncommand = [\"benchprep-missing-fetch-tool\", \"{slug}\"]\n",
    )
    .expect("config");

    let output = benchprep(&root, &["fetch-build", "--no-build"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let lines = stdout_lines(&output);
    assert!(lines.contains(
        &"Executed: 3; Success: 0; Already done: 0; Missing prerequisite: 0; Failed: 3".to_string()
    ));
    assert!(lines.contains(&"  failed at fetch: 3".to_string()));
    assert!(root.path().join("project-sources").is_dir());
}

#[test]
fn toolchain_failure_aborts_before_dispatch() {
    let root = scenario_root();
    fs::write(
        root.path().join("benchprep.toml"),
        "[setup]\ncommands = [[\"benchprep-missing-setup-tool\"]]\n",
    )
    .expect("config");

    let output = benchprep(&root, &["fetch-build"]);

    assert_eq!(output.status.code(), Some(exit_codes::SETUP_FAILED));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("== Processing"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("toolchain setup"));
}
