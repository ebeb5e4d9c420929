//! Isolated per-iteration runtime for executing a generated project's tests.
//!
//! A [`TestingEnvironment`] owns one testing directory. Bootstrapping detects
//! which ecosystems are present, provisions an isolated interpreter or
//! package tree for each, and records whether that succeeded. Callers must
//! check [`TestingEnvironment::deps_setup_complete`] before trusting test
//! results produced inside it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::core::types::FileMap;
use crate::io::config::{PipelineConfig, TimeoutConfig, ToolchainConfig};
use crate::io::fs::{remove_dir_if_exists, write_atomic, write_json};
use crate::io::process::{CommandOutput, CommandRunner, CommandSpec, tail_chars};

const PYTEST_INI: &str = include_str!("scaffold/pytest.ini");
const JEST_CONFIG_NODE: &str = include_str!("scaffold/jest.config.node.js");
const JEST_CONFIG_REACT: &str = include_str!("scaffold/jest.config.react.js");

const PYTHON_TEST_PACKAGES: &[&str] = &["pytest", "pytest-asyncio", "pytest-mock"];
const REACT_TEST_PACKAGES: &[&str] = &[
    "@testing-library/react",
    "@testing-library/jest-dom",
    "@testing-library/user-event",
];
const NODE_EXTENSIONS: &[&str] = &[".js", ".ts", ".jsx", ".tsx"];
const REACT_EXTENSIONS: &[&str] = &[".jsx", ".tsx"];

/// Characters of captured output kept in setup error messages.
const ERROR_OUTPUT_CHARS: usize = 500;

/// A dependency bootstrapping step failed or timed out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("environment setup failed at {step}: {message}")]
pub struct EnvironmentSetupError {
    pub step: String,
    pub message: String,
}

impl EnvironmentSetupError {
    fn new(step: &str, message: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            message: message.into(),
        }
    }
}

/// Runtime ecosystems detected from file names.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ecosystems {
    pub python: bool,
    pub node: bool,
    /// JSX/TSX sources present (needs a DOM test environment).
    pub react: bool,
}

impl Ecosystems {
    pub fn detect(files: &FileMap) -> Self {
        let has_ext = |exts: &[&str]| files.keys().any(|p| exts.iter().any(|e| p.ends_with(e)));
        let has_name = |name: &str| files.contains_key(name);
        Self {
            python: has_ext(&[".py"]) || has_name("requirements.txt"),
            node: has_ext(NODE_EXTENSIONS) || has_name("package.json"),
            react: has_ext(REACT_EXTENSIONS),
        }
    }

    pub fn any(self) -> bool {
        self.python || self.node
    }
}

/// Which test invocation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCommandKind {
    Python,
    Node,
}

/// Timeouts, program names and output bounds for environment commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSettings {
    pub timeouts: TimeoutConfig,
    pub toolchain: ToolchainConfig,
    pub output_limit_bytes: usize,
}

impl EnvironmentSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            timeouts: config.timeouts.clone(),
            toolchain: config.toolchain.clone(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Readiness report from [`TestingEnvironment::verify_environment`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentVerification {
    pub python_ready: bool,
    pub node_ready: bool,
    pub dependencies_installed: bool,
    pub overall_ready: bool,
    pub issues: Vec<String>,
}

pub struct TestingEnvironment {
    path: PathBuf,
    ecosystems: Ecosystems,
    deps_setup_complete: bool,
    setup_error: Option<EnvironmentSetupError>,
    settings: EnvironmentSettings,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for TestingEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestingEnvironment")
            .field("path", &self.path)
            .field("ecosystems", &self.ecosystems)
            .field("deps_setup_complete", &self.deps_setup_complete)
            .field("setup_error", &self.setup_error)
            .finish_non_exhaustive()
    }
}

impl TestingEnvironment {
    /// Wrap an existing testing directory whose content is `files`. Nothing
    /// is installed until [`Self::setup_dependencies`] runs.
    pub fn new(
        path: &Path,
        files: &FileMap,
        settings: EnvironmentSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let path = std::path::absolute(path)
            .with_context(|| format!("resolve {}", path.display()))?;
        Ok(Self {
            path,
            ecosystems: Ecosystems::detect(files),
            deps_setup_complete: false,
            setup_error: None,
            settings,
            runner,
        })
    }

    /// Construct and bootstrap. Setup failures are recorded on the returned
    /// environment rather than returned.
    pub async fn bootstrap(
        path: &Path,
        files: &FileMap,
        settings: EnvironmentSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let mut env = Self::new(path, files, settings, runner)?;
        if let Err(err) = env.setup_dependencies().await {
            warn!(step = %err.step, err = %err.message, "continuing with untrusted environment");
        }
        Ok(env)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ecosystems(&self) -> Ecosystems {
        self.ecosystems
    }

    pub fn deps_setup_complete(&self) -> bool {
        self.deps_setup_complete
    }

    pub fn setup_error(&self) -> Option<&EnvironmentSetupError> {
        self.setup_error.as_ref()
    }

    pub fn venv_path(&self) -> PathBuf {
        self.path.join(".venv")
    }

    pub fn node_modules_path(&self) -> PathBuf {
        self.path.join("node_modules")
    }

    pub fn venv_python(&self) -> PathBuf {
        if cfg!(windows) {
            self.venv_path().join("Scripts").join("python.exe")
        } else {
            self.venv_path().join("bin").join("python")
        }
    }

    /// Provision every detected ecosystem.
    ///
    /// The completion flag is cleared first and only set when every
    /// critical step succeeded. The failing step is kept for reporting.
    #[instrument(skip_all, fields(path = %self.path.display(), python = self.ecosystems.python, node = self.ecosystems.node))]
    pub async fn setup_dependencies(&mut self) -> Result<(), EnvironmentSetupError> {
        self.deps_setup_complete = false;
        self.setup_error = None;

        let result = self.run_setup().await;
        match &result {
            Ok(()) => {
                self.deps_setup_complete = true;
                info!("dependencies setup completed");
            }
            Err(err) => {
                error!(step = %err.step, err = %err.message, "dependency setup failed");
                self.setup_error = Some(err.clone());
            }
        }
        result
    }

    async fn run_setup(&self) -> Result<(), EnvironmentSetupError> {
        if self.ecosystems.python {
            self.setup_python().await?;
        }
        if self.ecosystems.node {
            self.setup_node().await?;
        }
        self.write_framework_configs()
    }

    async fn setup_python(&self) -> Result<(), EnvironmentSetupError> {
        let timeouts = &self.settings.timeouts;
        if !self.venv_path().exists() {
            let spec = self
                .spec(&self.settings.toolchain.python, timeouts.venv)
                .args(["-m", "venv", ".venv"]);
            self.run_step("python_venv", spec).await?;
        }

        let python = self.venv_python().to_string_lossy().into_owned();
        let spec = self
            .spec(&python, timeouts.pip_upgrade)
            .args(["-m", "pip", "install", "--upgrade", "pip"]);
        self.run_step("pip_upgrade", spec).await?;

        let spec = self
            .spec(&python, timeouts.base_packages)
            .args(["-m", "pip", "install"])
            .args(PYTHON_TEST_PACKAGES.iter().copied());
        self.run_step("python_test_packages", spec).await?;

        if self.path.join("requirements.txt").exists() {
            let spec = self
                .spec(&python, timeouts.project_dependencies)
                .args(["-m", "pip", "install", "-r", "requirements.txt"]);
            self.run_step("python_project_dependencies", spec).await?;
        }

        let spec = self
            .spec(&python, timeouts.verify)
            .args(["-c", "import pytest; print('pytest available')"]);
        if !self.probe(spec).await {
            warn!("python environment verification failed");
        }
        Ok(())
    }

    async fn setup_node(&self) -> Result<(), EnvironmentSetupError> {
        let timeouts = &self.settings.timeouts;
        let npm = &self.settings.toolchain.npm;
        if !self.path.join("package.json").exists() {
            self.write_minimal_package_json()?;
        }

        if !self.node_modules_path().exists() {
            let spec = self
                .spec(npm, timeouts.npm_install)
                .args(["install", "--no-audit", "--no-fund"]);
            self.run_step("npm_install", spec).await?;
        }

        let mut missing: Vec<&str> = Vec::new();
        if !self.probe(self.spec(npm, timeouts.probe).args(["list", "jest"])).await {
            missing.push("jest");
        }
        if self.ecosystems.react
            && !self
                .probe(
                    self.spec(npm, timeouts.probe)
                        .args(["list", "@testing-library/react"]),
                )
                .await
        {
            missing.extend(REACT_TEST_PACKAGES);
        }
        if !missing.is_empty() {
            info!(packages = %missing.join(", "), "installing missing test packages");
            let spec = self
                .spec(npm, timeouts.test_frameworks)
                .args(["install", "--save-dev", "--no-audit", "--no-fund"])
                .args(missing.iter().copied());
            if let Err(err) = self.run_step("node_test_frameworks", spec).await {
                warn!(err = %err, "could not install test frameworks");
            }
        }

        if !self.probe(self.spec(npm, timeouts.probe).args(["list", "jest"])).await {
            warn!("jest not found, continuing");
        }
        Ok(())
    }

    fn write_minimal_package_json(&self) -> Result<(), EnvironmentSetupError> {
        let manifest = serde_json::json!({
            "name": "test-environment",
            "version": "1.0.0",
            "description": "Temporary testing environment",
            "scripts": {
                "test": "jest --watchAll=false",
                "test:coverage": "jest --coverage --watchAll=false"
            },
            "devDependencies": {}
        });
        write_json(&self.path.join("package.json"), &manifest)
            .map_err(|e| EnvironmentSetupError::new("package_json", format!("{e:#}")))?;
        info!("created minimal package.json");
        Ok(())
    }

    fn write_framework_configs(&self) -> Result<(), EnvironmentSetupError> {
        let mut configs = Vec::new();
        if self.ecosystems.node {
            let jest = if self.ecosystems.react {
                JEST_CONFIG_REACT
            } else {
                JEST_CONFIG_NODE
            };
            configs.push(("jest.config.js", jest));
        }
        if self.ecosystems.python {
            configs.push(("pytest.ini", PYTEST_INI));
        }
        for (name, contents) in configs {
            let path = self.path.join(name);
            if path.exists() {
                continue;
            }
            write_atomic(&path, contents)
                .map_err(|e| EnvironmentSetupError::new("framework_config", format!("{e:#}")))?;
        }
        Ok(())
    }

    /// Smoke-check each detected ecosystem.
    #[instrument(skip_all)]
    pub async fn verify_environment(&self) -> EnvironmentVerification {
        let timeouts = &self.settings.timeouts;
        let mut verification = EnvironmentVerification {
            python_ready: !self.ecosystems.python,
            node_ready: !self.ecosystems.node,
            dependencies_installed: self.deps_setup_complete,
            ..EnvironmentVerification::default()
        };

        if self.ecosystems.python {
            let python = self.venv_python().to_string_lossy().into_owned();
            let spec = self
                .spec(&python, timeouts.verify)
                .args(["-c", "import pytest; print('OK')"]);
            match self.runner.run(&spec).await {
                Ok(output) => {
                    verification.python_ready = output.success();
                    if !output.success() {
                        verification.issues.push("Python pytest not available".to_string());
                    }
                }
                Err(err) => {
                    warn!(err = %err, "python verification failed");
                    verification
                        .issues
                        .push("Python environment verification failed".to_string());
                }
            }
        }

        if self.ecosystems.node {
            let node = self
                .spec(&self.settings.toolchain.node, timeouts.verify)
                .args(["--version"]);
            verification.node_ready = self.probe(node).await;
            if !verification.node_ready {
                verification.issues.push("Node.js not available".to_string());
            } else {
                let list = self
                    .spec(&self.settings.toolchain.npm, timeouts.probe)
                    .args(["list", "--depth=0"]);
                if !self.probe(list).await {
                    verification
                        .issues
                        .push("npm dependencies not properly installed".to_string());
                }
            }
        }

        if !self.deps_setup_complete
            && let Some(err) = &self.setup_error
        {
            verification.issues.push(err.to_string());
        }
        verification.overall_ready = verification.python_ready
            && verification.node_ready
            && verification.dependencies_installed;
        verification
    }

    /// Argv for a test invocation, or `None` when that ecosystem is absent.
    pub fn get_test_command(&self, kind: TestCommandKind) -> Option<Vec<String>> {
        let toolchain = &self.settings.toolchain;
        match kind {
            TestCommandKind::Python if self.ecosystems.python => Some(vec![
                self.venv_python().to_string_lossy().into_owned(),
                "-m".to_string(),
                "pytest".to_string(),
                "-v".to_string(),
                "--tb=short".to_string(),
            ]),
            TestCommandKind::Node if self.ecosystems.node => {
                if self.path.join("package.json").exists() {
                    Some(
                        [toolchain.npm.as_str(), "test", "--", "--watchAll=false"]
                            .map(String::from)
                            .to_vec(),
                    )
                } else {
                    Some(
                        [toolchain.npx.as_str(), "jest", "--watchAll=false"]
                            .map(String::from)
                            .to_vec(),
                    )
                }
            }
            TestCommandKind::Python | TestCommandKind::Node => None,
        }
    }

    /// Fully configured test invocation inside this environment.
    pub fn test_spec(&self, kind: TestCommandKind) -> Option<CommandSpec> {
        let argv = self.get_test_command(kind)?;
        let (program, args) = argv.split_first()?;
        Some(
            self.spec(program, self.settings.timeouts.test_run)
                .args(args.iter().cloned()),
        )
    }

    pub async fn run_test_command(&self, kind: TestCommandKind) -> Option<Result<CommandOutput>> {
        let spec = self.test_spec(kind)?;
        Some(self.runner.run(&spec).await)
    }

    /// Remove installed runtimes and package trees; other files stay.
    pub fn cleanup(&self) -> Result<()> {
        remove_dir_if_exists(&self.venv_path())?;
        remove_dir_if_exists(&self.node_modules_path())?;
        info!(path = %self.path.display(), "testing environment cleaned up");
        Ok(())
    }

    fn spec(&self, program: &str, timeout_secs: u64) -> CommandSpec {
        let mut spec = CommandSpec::new(
            program,
            Duration::from_secs(timeout_secs),
            self.settings.output_limit_bytes,
        )
        .cwd(&self.path)
        .env("NODE_ENV", "test")
        .env("CI", "true")
        .env("FORCE_COLOR", "0");
        if self.ecosystems.python {
            spec = spec.env("PYTHONPATH", self.path.to_string_lossy());
        }
        spec
    }

    async fn run_step(
        &self,
        step: &str,
        spec: CommandSpec,
    ) -> Result<CommandOutput, EnvironmentSetupError> {
        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| EnvironmentSetupError::new(step, format!("{e:#}")))?;
        if output.timed_out {
            error!(step, command = %spec, stdout = %output.stdout_text(), stderr = %output.stderr_text(), "setup step timed out");
            return Err(EnvironmentSetupError::new(
                step,
                format!("`{spec}` timed out after {}s", spec.timeout.as_secs()),
            ));
        }
        if !output.success() {
            error!(step, command = %spec, stdout = %output.stdout_text(), stderr = %output.stderr_text(), "setup step failed");
            return Err(EnvironmentSetupError::new(
                step,
                format!(
                    "`{spec}` exited with {:?}: {}",
                    output.exit_code,
                    tail_chars(output.stderr_text().trim(), ERROR_OUTPUT_CHARS)
                ),
            ));
        }
        Ok(output)
    }

    async fn probe(&self, spec: CommandSpec) -> bool {
        match self.runner.run(&spec).await {
            Ok(output) => output.success(),
            Err(err) => {
                warn!(command = %spec, err = %err, "probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::test_support::{ScriptedCommandRunner, exit_output, timed_out_output};

    fn files(paths: &[&str]) -> FileMap {
        paths
            .iter()
            .map(|p| (p.to_string(), String::new()))
            .collect()
    }

    #[test]
    fn detects_ecosystems_from_names() {
        let eco = Ecosystems::detect(&files(&["app/main.py", "src/App.tsx"]));
        assert!(eco.python && eco.node && eco.react);
        let eco = Ecosystems::detect(&files(&["requirements.txt"]));
        assert!(eco.python && !eco.node);
        let eco = Ecosystems::detect(&files(&["README.md"]));
        assert!(!eco.any());
    }

    #[tokio::test]
    async fn python_setup_runs_steps_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("requirements.txt"), "fastapi\n").expect("write");
        let runner = Arc::new(ScriptedCommandRunner::new());
        let mut env = TestingEnvironment::new(
            temp.path(),
            &files(&["main.py", "requirements.txt"]),
            EnvironmentSettings::default(),
            runner.clone(),
        )
        .expect("env");
        env.setup_dependencies().await.expect("setup");
        assert!(env.deps_setup_complete());

        let calls = runner.call_lines();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[0], "python3 -m venv .venv");
        assert!(calls[1].ends_with("-m pip install --upgrade pip"));
        assert!(calls[2].ends_with("-m pip install pytest pytest-asyncio pytest-mock"));
        assert!(calls[3].ends_with("-m pip install -r requirements.txt"));
        assert!(temp.path().join("pytest.ini").is_file());
        assert!(!temp.path().join("jest.config.js").exists());
    }

    #[tokio::test]
    async fn timeout_marks_environment_untrusted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(
            ScriptedCommandRunner::new().respond("pytest-asyncio", timed_out_output()),
        );
        let mut env = TestingEnvironment::new(
            temp.path(),
            &files(&["main.py"]),
            EnvironmentSettings::default(),
            runner.clone(),
        )
        .expect("env");
        let err = env.setup_dependencies().await.expect_err("timeout");
        assert_eq!(err.step, "python_test_packages");
        assert!(err.message.contains("timed out"));
        assert!(!env.deps_setup_complete());
        assert_eq!(env.setup_error(), Some(&err));

        // Bootstrapping swallows the same failure into the flag.
        let env = TestingEnvironment::bootstrap(
            temp.path(),
            &files(&["main.py"]),
            EnvironmentSettings::default(),
            runner,
        )
        .await
        .expect("bootstrap");
        assert!(!env.deps_setup_complete());
        let verification = env.verify_environment().await;
        assert!(!verification.overall_ready);
        assert!(verification.issues.iter().any(|i| i.contains("python_test_packages")));
    }

    #[tokio::test]
    async fn node_setup_installs_missing_frameworks_non_fatally() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(
            ScriptedCommandRunner::new()
                .respond("npm list jest", exit_output(1, "missing"))
                .respond("npm list @testing-library/react", exit_output(1, "missing"))
                .respond("--save-dev", exit_output(1, "offline")),
        );
        let mut env = TestingEnvironment::new(
            temp.path(),
            &files(&["src/App.jsx"]),
            EnvironmentSettings::default(),
            runner.clone(),
        )
        .expect("env");
        env.setup_dependencies().await.expect("setup");
        assert!(env.deps_setup_complete());

        let calls = runner.call_lines();
        assert_eq!(calls[0], "npm install --no-audit --no-fund");
        let install = calls
            .iter()
            .find(|c| c.contains("--save-dev"))
            .expect("framework install");
        assert!(install.ends_with("jest @testing-library/react @testing-library/jest-dom @testing-library/user-event"));

        let manifest: serde_json::Value =
            crate::io::fs::read_json(&temp.path().join("package.json")).expect("package.json");
        assert_eq!(manifest["scripts"]["test"], "jest --watchAll=false");
        let jest = fs::read_to_string(temp.path().join("jest.config.js")).expect("jest");
        assert!(jest.contains("jsdom"));
    }

    #[test]
    fn test_commands_follow_ecosystems() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedCommandRunner::new());
        let env = TestingEnvironment::new(
            temp.path(),
            &files(&["index.js"]),
            EnvironmentSettings::default(),
            runner,
        )
        .expect("env");
        assert_eq!(env.get_test_command(TestCommandKind::Python), None);
        assert_eq!(
            env.get_test_command(TestCommandKind::Node),
            Some(vec!["npx".to_string(), "jest".to_string(), "--watchAll=false".to_string()])
        );
        fs::write(temp.path().join("package.json"), "{}").expect("write");
        assert_eq!(
            env.get_test_command(TestCommandKind::Node),
            Some(
                ["npm", "test", "--", "--watchAll=false"]
                    .map(String::from)
                    .to_vec()
            )
        );
    }

    #[test]
    fn cleanup_removes_heavy_artifacts_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join(".venv/bin")).expect("venv");
        fs::create_dir_all(temp.path().join("node_modules/jest")).expect("modules");
        fs::write(temp.path().join("setup.log"), "log").expect("log");
        let env = TestingEnvironment::new(
            temp.path(),
            &files(&["main.py"]),
            EnvironmentSettings::default(),
            Arc::new(ScriptedCommandRunner::new()),
        )
        .expect("env");
        env.cleanup().expect("cleanup");
        assert!(!temp.path().join(".venv").exists());
        assert!(!temp.path().join("node_modules").exists());
        assert!(temp.path().join("setup.log").exists());
    }
}
