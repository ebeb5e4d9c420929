//! Pipeline configuration stored in `genloop.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::strategy::TestingMode;
use crate::io::fs::write_atomic;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "genloop.toml";

/// Pipeline configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to values that
/// work on a typical developer machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory under which one subdirectory per project is created.
    pub output_root: PathBuf,

    /// Upper bound on generate/test passes per project.
    pub max_iterations: u32,

    /// Provider label forwarded to the text generator.
    pub provider: String,

    pub testing_mode: TestingMode,

    /// Bytes of stdout/stderr retained per external command.
    pub output_limit_bytes: usize,

    pub timeouts: TimeoutConfig,
    pub toolchain: ToolchainConfig,
    pub llm: LlmConfig,
}

/// Per-step timeouts in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub venv: u64,
    pub pip_upgrade: u64,
    pub base_packages: u64,
    pub project_dependencies: u64,
    pub npm_install: u64,
    pub test_frameworks: u64,
    pub probe: u64,
    pub verify: u64,
    pub test_run: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            venv: 60,
            pip_upgrade: 60,
            base_packages: 120,
            project_dependencies: 300,
            npm_install: 300,
            test_frameworks: 180,
            probe: 30,
            verify: 30,
            test_run: 300,
        }
    }
}

impl TimeoutConfig {
    pub fn duration(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    fn all(&self) -> [(&'static str, u64); 9] {
        [
            ("venv", self.venv),
            ("pip_upgrade", self.pip_upgrade),
            ("base_packages", self.base_packages),
            ("project_dependencies", self.project_dependencies),
            ("npm_install", self.npm_install),
            ("test_frameworks", self.test_frameworks),
            ("probe", self.probe),
            ("verify", self.verify),
            ("test_run", self.test_run),
        ]
    }
}

/// Program names used to bootstrap testing environments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolchainConfig {
    pub python: String,
    pub npm: String,
    pub node: String,
    pub npx: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            npm: "npm".to_string(),
            node: "node".to_string(),
            npx: "npx".to_string(),
        }
    }
}

/// External text-generation command. The prompt is written to its stdin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmConfig {
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            timeout_secs: 10 * 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("generated_projects"),
            max_iterations: 3,
            provider: "default".to_string(),
            testing_mode: TestingMode::default(),
            output_limit_bytes: 100_000,
            timeouts: TimeoutConfig::default(),
            toolchain: ToolchainConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        for (name, secs) in self.timeouts.all() {
            if secs == 0 {
                return Err(anyhow!("timeouts.{name} must be > 0"));
            }
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        if self.llm.command.is_empty() || self.llm.command[0].trim().is_empty() {
            return Err(anyhow!("llm.command must be a non-empty array"));
        }
        let programs = [
            ("python", &self.toolchain.python),
            ("npm", &self.toolchain.npm),
            ("node", &self.toolchain.node),
            ("npx", &self.toolchain.npx),
        ];
        for (name, program) in programs {
            if program.trim().is_empty() {
                return Err(anyhow!("toolchain.{name} must not be empty"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
