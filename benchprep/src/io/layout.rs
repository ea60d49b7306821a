//! Filesystem layout under the run root and the skip guard built on it.
//!
//! ```text
//! <root>/project-sources/<slug>/target/*.jar                  build artifacts
//! <root>/project-sources/<slug>/spotbugs-out/result.txt       completion marker + report
//! <root>/project-sources/<slug>/spotbugs-out/result_<jar>.txt per-artifact report
//! <root>/build-info/logs/<slug>/<stage>.log                   captured step output
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const SOURCES_DIR: &str = "project-sources";
pub const BUILD_INFO_DIR: &str = "build-info";
pub const TARGET_DIR: &str = "target";
pub const ANALYSIS_DIR: &str = "spotbugs-out";
pub const REPORT_FILE: &str = "result.txt";
/// Only files whose extension is exactly `jar` are analyzed. Names that merely
/// contain `.jar`, such as `app.jar.original`, are skipped on purpose.
pub const ARTIFACT_EXTENSION: &str = "jar";

/// Resolved paths for one run root. Passed explicitly to every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.root.join(SOURCES_DIR)
    }

    pub fn build_info_dir(&self) -> PathBuf {
        self.root.join(BUILD_INFO_DIR)
    }

    pub fn project_dir(&self, slug: &str) -> PathBuf {
        self.sources_dir().join(slug)
    }

    pub fn target_dir(&self, slug: &str) -> PathBuf {
        self.project_dir(slug).join(TARGET_DIR)
    }

    pub fn analysis_dir(&self, slug: &str) -> PathBuf {
        self.project_dir(slug).join(ANALYSIS_DIR)
    }

    /// Aggregated report; its presence marks analysis as complete.
    pub fn report_path(&self, slug: &str) -> PathBuf {
        self.analysis_dir(slug).join(REPORT_FILE)
    }

    /// Raw report for one artifact, keyed by the artifact's file name.
    pub fn artifact_report_path(&self, slug: &str, artifact: &Path) -> PathBuf {
        let name = artifact
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| artifact.display().to_string());
        self.analysis_dir(slug).join(format!("result_{name}.txt"))
    }

    pub fn step_log_path(&self, slug: &str, stage: &str) -> PathBuf {
        self.build_info_dir()
            .join("logs")
            .join(slug)
            .join(format!("{stage}.log"))
    }

    pub fn already_done(&self, slug: &str) -> bool {
        self.report_path(slug).is_file()
    }

    /// Whether the build stage left a target directory behind.
    pub fn has_prerequisite(&self, slug: &str) -> bool {
        self.target_dir(slug).is_dir()
    }

    /// Build artifacts to analyze, sorted by file name.
    pub fn artifacts(&self, slug: &str) -> io::Result<Vec<PathBuf>> {
        let mut artifacts = Vec::new();
        for entry in fs::read_dir(self.target_dir(slug))? {
            let path = entry?.path();
            if path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(ARTIFACT_EXTENSION)
            {
                artifacts.push(path);
            }
        }
        artifacts.sort();
        Ok(artifacts)
    }

    pub fn ensure_analysis_dir(&self, slug: &str) -> Result<PathBuf> {
        let dir = self.analysis_dir(slug);
        ensure_dir(&dir)?;
        Ok(dir)
    }
}

/// Create `dir` and its parents if absent. Existing directories are fine.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))
}

/// Write via a sibling temp file and rename so readers never see partial contents.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    ensure_dir(parent)?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_follow_layout() {
        let layout = Layout::new("/bench");
        assert_eq!(
            layout.report_path("p1"),
            PathBuf::from("/bench/project-sources/p1/spotbugs-out/result.txt")
        );
        assert_eq!(
            layout.artifact_report_path("p1", Path::new("/bench/project-sources/p1/target/app-1.0.jar")),
            PathBuf::from("/bench/project-sources/p1/spotbugs-out/result_app-1.0.jar.txt")
        );
        assert_eq!(
            layout.step_log_path("p1", "build"),
            PathBuf::from("/bench/build-info/logs/p1/build.log")
        );
    }

    #[test]
    fn already_done_tracks_marker() {
        let temp = tempdir().expect("tempdir");
        let layout = Layout::new(temp.path());
        assert!(!layout.already_done("p1"));
        layout.ensure_analysis_dir("p1").expect("dir");
        assert!(!layout.already_done("p1"));
        fs::write(layout.report_path("p1"), "").expect("marker");
        assert!(layout.already_done("p1"));
    }

    #[test]
    fn artifacts_lists_only_jars_sorted() {
        let temp = tempdir().expect("tempdir");
        let layout = Layout::new(temp.path());
        assert!(!layout.has_prerequisite("p1"));
        let target = layout.target_dir("p1");
        fs::create_dir_all(target.join("classes.jar")).expect("dir named like a jar");
        fs::write(target.join("z-app.jar"), "").expect("jar");
        fs::write(target.join("a-lib.jar"), "").expect("jar");
        fs::write(target.join("notes.txt"), "").expect("txt");
        fs::write(target.join("app.jar.original"), "").expect("repackaged original");
        assert!(layout.has_prerequisite("p1"));

        let names: Vec<String> = layout
            .artifacts("p1")
            .expect("artifacts")
            .iter()
            .map(|path| path.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a-lib.jar", "z-app.jar"]);
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let layout = Layout::new(temp.path());
        let first = layout.ensure_analysis_dir("p1").expect("first");
        let second = layout.ensure_analysis_dir("p1").expect("second");
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested/report.txt");
        write_atomic(&path, b"one").expect("write one");
        write_atomic(&path, b"two").expect("write two");
        assert_eq!(fs::read(&path).expect("read"), b"two");
        assert!(!temp.path().join("nested/report.txt.tmp").exists());
    }
}
