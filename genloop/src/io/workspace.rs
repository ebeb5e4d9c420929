//! Per-iteration scratch directory.
//!
//! Layout under the workspace root:
//! - `generation/` raw generated files as produced
//! - `testing/` the same files plus tests, with an isolated runtime

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::types::FileMap;
use crate::io::fs::{remove_dir_if_exists, write_tree};
use crate::io::process::CommandRunner;
use crate::io::testing_env::{EnvironmentSettings, TestingEnvironment};

pub const GENERATION_DIR: &str = "generation";
pub const TESTING_DIR: &str = "testing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceEnvironment {
    root: PathBuf,
}

impl WorkspaceEnvironment {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation_path(&self) -> PathBuf {
        self.root.join(GENERATION_DIR)
    }

    pub fn testing_path(&self) -> PathBuf {
        self.root.join(TESTING_DIR)
    }

    /// Destroy whatever is at the root and recreate the empty subtrees.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn clean_and_prepare(&self) -> Result<()> {
        remove_dir_if_exists(&self.root)?;
        for dir in [self.generation_path(), self.testing_path()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("create workspace directory {}", dir.display()))?;
        }
        debug!("workspace prepared");
        Ok(())
    }

    pub fn save_generated_code(&self, files: &FileMap) -> Result<()> {
        write_tree(&self.generation_path(), files)
    }

    /// Write `files` into the testing tree and bootstrap its runtime.
    ///
    /// Dependency failures are recorded on the returned environment; only
    /// failures to write the files themselves are returned as errors.
    #[instrument(skip_all, fields(files = files.len()))]
    pub async fn prepare_testing_environment(
        &self,
        files: &FileMap,
        settings: EnvironmentSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<TestingEnvironment> {
        let testing = self.testing_path();
        write_tree(&testing, files)?;
        let env = TestingEnvironment::bootstrap(&testing, files, settings, runner).await?;
        if !env.deps_setup_complete() {
            warn!(path = %testing.display(), "testing environment not ready, results are untrusted");
        }
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fs::read_tree;
    use crate::test_support::{ScriptedCommandRunner, file_map, timed_out_output};

    fn entries(path: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(path)
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn prepare_leaves_only_empty_subtrees() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = WorkspaceEnvironment::new(temp.path().join("workspace"));
        ws.clean_and_prepare().expect("first prepare");
        ws.save_generated_code(&file_map(&[("app/main.py", "print(1)")]))
            .expect("save");
        fs::create_dir_all(ws.testing_path().join(".venv/bin")).expect("venv");
        fs::write(ws.root().join("stray.txt"), "x").expect("stray");

        ws.clean_and_prepare().expect("second prepare");
        assert_eq!(entries(ws.root()), vec!["generation", "testing"]);
        assert!(entries(&ws.generation_path()).is_empty());
        assert!(entries(&ws.testing_path()).is_empty());
    }

    #[test]
    fn prepare_is_safe_without_prior_workspace() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = WorkspaceEnvironment::new(temp.path().join("missing/workspace"));
        ws.clean_and_prepare().expect("prepare");
        assert!(ws.generation_path().is_dir());
    }

    #[tokio::test]
    async fn testing_environment_survives_setup_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = WorkspaceEnvironment::new(temp.path().join("workspace"));
        ws.clean_and_prepare().expect("prepare");
        let files = file_map(&[("package.json", "{}"), ("src/index.js", "module.exports = 1;")]);
        let runner = Arc::new(ScriptedCommandRunner::new().respond("npm install", timed_out_output()));

        let env = ws
            .prepare_testing_environment(&files, EnvironmentSettings::default(), runner)
            .await
            .expect("prepare testing");
        assert!(!env.deps_setup_complete());
        assert_eq!(env.setup_error().map(|e| e.step.as_str()), Some("npm_install"));

        let written = read_tree(&ws.testing_path()).expect("read");
        assert_eq!(written.get("src/index.js").map(String::as_str), Some("module.exports = 1;"));
    }
}
