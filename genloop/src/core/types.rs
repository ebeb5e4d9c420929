//! Shared record types for iterations and test outcomes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Relative path to textual content. Ordered so every derived artifact is stable.
pub type FileMap = BTreeMap<String, String>;

/// Outcome label of one generation pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Success,
    Failed,
    Partial,
}

impl IterationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IterationStatus::Success => "success",
            IterationStatus::Failed => "failed",
            IterationStatus::Partial => "partial",
        }
    }
}

impl fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one test suite run (one per detected ecosystem).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SuiteResult {
    pub success: bool,
    pub message: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl SuiteResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Aggregated test outcome of an iteration, keyed by suite name
/// (`backend`, `frontend`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestResults {
    #[serde(default)]
    pub success: bool,
    #[serde(flatten)]
    pub suites: BTreeMap<String, SuiteResult>,
}

impl TestResults {
    /// Number of suites that did not succeed.
    pub fn failure_count(&self) -> u32 {
        self.suites.values().filter(|suite| !suite.success).count() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }
}

/// One failure extracted from a test run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestFailure {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Immutable record of one generation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationResult {
    pub iteration: u32,
    pub status: IterationStatus,
    pub validation_errors: u32,
    pub compilation_success: bool,
    pub test_results: TestResults,
    pub code_files_count: usize,
    pub test_files_count: usize,
    /// Wall-clock seconds.
    pub duration: f64,
    pub errors_fixed: Vec<String>,
    pub improvements: Vec<String>,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

impl IterationResult {
    /// Validation errors + compile failure + failing suites.
    pub fn total_active_errors(&self) -> u32 {
        self.validation_errors
            + u32::from(!self.compilation_success)
            + self.test_results.failure_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_serialize_suites_flat() {
        let mut results = TestResults::default();
        results
            .suites
            .insert("backend".to_string(), SuiteResult::failed("boom"));
        let value = serde_json::to_value(&results).expect("serialize");
        assert_eq!(value["success"], false);
        assert_eq!(value["backend"]["message"], "boom");

        let parsed: TestResults = serde_json::from_value(value).expect("parse");
        assert_eq!(parsed, results);
    }

    #[test]
    fn total_active_errors_counts_every_source() {
        let mut test_results = TestResults::default();
        test_results
            .suites
            .insert("backend".to_string(), SuiteResult::failed("x"));
        test_results.suites.insert(
            "frontend".to_string(),
            SuiteResult {
                success: true,
                ..SuiteResult::default()
            },
        );
        let result = IterationResult {
            iteration: 1,
            status: IterationStatus::Failed,
            validation_errors: 2,
            compilation_success: false,
            test_results,
            code_files_count: 3,
            test_files_count: 1,
            duration: 1.0,
            errors_fixed: Vec::new(),
            improvements: Vec::new(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };
        assert_eq!(result.total_active_errors(), 4);
    }
}
