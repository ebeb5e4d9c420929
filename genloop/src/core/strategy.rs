//! Testing strategy selection.

use serde::{Deserialize, Serialize};

use crate::core::types::FileMap;

const QUALITY_KEYWORDS: &[&str] = &["production", "enterprise", "critical", "secure", "scalable"];
const FRONTEND_EXTENSIONS: &[&str] = &[".js", ".jsx", ".ts", ".tsx"];

/// How the pipeline engages automatic testing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TestingMode {
    Disabled,
    #[serde(alias = "quick_only")]
    Quick,
    #[default]
    Standard,
    Thorough,
    Adaptive,
    OnDemand,
}

impl TestingMode {
    /// `disabled` and `on_demand` never test automatically.
    pub fn runs_automatically(self) -> bool {
        !matches!(self, TestingMode::Disabled | TestingMode::OnDemand)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestingStrategy {
    Quick,
    Standard,
    Thorough,
}

/// Preset bundle driving the multi-attempt testing workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestingConfig {
    pub strategy: TestingStrategy,
    pub max_attempts: u32,
    pub coverage_threshold: f64,
    pub fail_fast: bool,
    pub retry_failed_tests: bool,
    pub generate_reports: bool,
}

impl TestingConfig {
    pub fn quick() -> Self {
        Self {
            strategy: TestingStrategy::Quick,
            max_attempts: 1,
            coverage_threshold: 80.0,
            fail_fast: true,
            retry_failed_tests: true,
            generate_reports: false,
        }
    }

    pub fn standard() -> Self {
        Self {
            strategy: TestingStrategy::Standard,
            max_attempts: 2,
            coverage_threshold: 75.0,
            fail_fast: false,
            retry_failed_tests: true,
            generate_reports: true,
        }
    }

    pub fn thorough() -> Self {
        Self {
            strategy: TestingStrategy::Thorough,
            max_attempts: 3,
            coverage_threshold: 85.0,
            fail_fast: false,
            retry_failed_tests: true,
            generate_reports: true,
        }
    }

    pub fn for_strategy(strategy: TestingStrategy) -> Self {
        match strategy {
            TestingStrategy::Quick => Self::quick(),
            TestingStrategy::Standard => Self::standard(),
            TestingStrategy::Thorough => Self::thorough(),
        }
    }
}

/// Complexity score used by adaptive selection.
pub fn complexity_score(files: &FileMap, requirements_text: &str) -> u32 {
    let mut score = match files.len() {
        n if n > 20 => 3,
        n if n > 10 => 2,
        n if n > 5 => 1,
        _ => 0,
    };

    let has_frontend = files
        .keys()
        .any(|p| FRONTEND_EXTENSIONS.iter().any(|ext| p.ends_with(ext)));
    let has_backend = files.keys().any(|p| p.ends_with(".py"));
    if has_frontend && has_backend {
        score += 2;
    }

    let has_persistence = files.keys().any(|p| {
        let lower = p.to_lowercase();
        lower.contains("model") || lower.contains("schema")
    });
    if has_persistence {
        score += 1;
    }

    let text = requirements_text.to_lowercase();
    score += QUALITY_KEYWORDS.iter().filter(|k| text.contains(*k)).count() as u32;
    score
}

pub fn strategy_for_score(score: u32) -> TestingStrategy {
    match score {
        s if s >= 6 => TestingStrategy::Thorough,
        s if s >= 3 => TestingStrategy::Standard,
        _ => TestingStrategy::Quick,
    }
}

/// Resolve the strategy for a mode, or `None` when testing does not run
/// automatically.
pub fn select_strategy(
    mode: TestingMode,
    files: &FileMap,
    requirements_text: &str,
) -> Option<TestingConfig> {
    if !mode.runs_automatically() {
        return None;
    }
    let strategy = match mode {
        TestingMode::Disabled | TestingMode::OnDemand | TestingMode::Quick => TestingStrategy::Quick,
        TestingMode::Standard => TestingStrategy::Standard,
        TestingMode::Thorough => TestingStrategy::Thorough,
        TestingMode::Adaptive => strategy_for_score(complexity_score(files, requirements_text)),
    };
    Some(TestingConfig::for_strategy(strategy))
}
