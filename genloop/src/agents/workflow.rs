//! Multi-attempt testing workflow.
//!
//! Runs the test agent up to the configured number of attempts, stopping
//! at the first success. Between attempts the LLM is asked for improvement
//! suggestions, which pass through an [`ImprovementApplier`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::agents::test_agent::{TestAgent, TestAnalysis};
use crate::core::classifier::{TestCategory, test_category};
use crate::core::strategy::TestingConfig;
use crate::core::types::FileMap;
use crate::io::fs::write_json;
use crate::io::llm::LlmClient;
use crate::io::prompt::{IMPROVEMENT_SYSTEM_PROMPT, PromptEngine, excerpts};

pub const REPORT_FILE_NAME: &str = "testing_report.json";

pub const ADD_UNIT_TESTS: &str = "Add basic unit tests";
pub const ADD_E2E_TESTS: &str = "Consider adding E2E tests";

/// One proposed change from the improvement request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImprovementSuggestion {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_modification")]
    pub modification_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
}

fn default_priority() -> String {
    "medium".to_string()
}

fn default_modification() -> String {
    "fix".to_string()
}

impl ImprovementSuggestion {
    /// Used when the reply cannot be parsed.
    pub fn manual_review() -> Self {
        Self {
            file: "general".to_string(),
            description: "Review the test failures and fix the reported issues manually"
                .to_string(),
            priority: default_priority(),
            modification_type: "review".to_string(),
            code_snippet: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SuggestionReply {
    #[serde(default)]
    suggestions: Vec<ImprovementSuggestion>,
}

/// Parse a `{"suggestions": [...]}` reply, tolerating prose around the
/// JSON object. Anything unusable yields the manual-review fallback.
pub fn parse_suggestions(reply: &str) -> Vec<ImprovementSuggestion> {
    let candidates = [
        Some(reply.trim()),
        reply
            .find('{')
            .zip(reply.rfind('}'))
            .filter(|(start, end)| start < end)
            .map(|(start, end)| &reply[start..=end]),
    ];
    for candidate in candidates.into_iter().flatten() {
        if let Ok(parsed) = serde_json::from_str::<SuggestionReply>(candidate)
            && !parsed.suggestions.is_empty()
        {
            return parsed.suggestions;
        }
    }
    vec![ImprovementSuggestion::manual_review()]
}

/// Seam for feeding suggestions back into the code between attempts.
pub trait ImprovementApplier: Send + Sync {
    fn apply(&self, files: &FileMap, suggestions: &[ImprovementSuggestion]) -> Result<FileMap>;
}

/// Keeps suggestions for reporting only; files are returned unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordOnly;

impl ImprovementApplier for RecordOnly {
    fn apply(&self, files: &FileMap, _suggestions: &[ImprovementSuggestion]) -> Result<FileMap> {
        Ok(files.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub success: bool,
    pub test_files: usize,
    pub failures: usize,
}

/// Which suites ran and how the generated tests spread over categories.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoverageView {
    pub suites: BTreeSet<String>,
    pub categories: BTreeMap<TestCategory, usize>,
    pub recommendations: Vec<String>,
}

impl CoverageView {
    pub fn from_analysis(analysis: &TestAnalysis) -> Self {
        let mut categories = BTreeMap::new();
        for path in analysis.test_files.keys() {
            *categories.entry(test_category(path)).or_insert(0) += 1;
        }
        let mut recommendations = Vec::new();
        if !categories.contains_key(&TestCategory::Unit) {
            recommendations.push(ADD_UNIT_TESTS.to_string());
        }
        if !categories.contains_key(&TestCategory::E2e) {
            recommendations.push(ADD_E2E_TESTS.to_string());
        }
        Self {
            suites: analysis.test_results.suites.keys().cloned().collect(),
            categories,
            recommendations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowReport {
    pub config: TestingConfig,
    pub attempts: Vec<AttemptRecord>,
    pub final_success: bool,
    pub final_analysis: TestAnalysis,
    pub suggestions: Vec<ImprovementSuggestion>,
    pub coverage: CoverageView,
    pub summary: String,
}

pub struct TestingWorkflow {
    agent: TestAgent,
    llm: Arc<dyn LlmClient>,
    applier: Box<dyn ImprovementApplier>,
    prompts: PromptEngine,
}

impl TestingWorkflow {
    pub fn new(agent: TestAgent, llm: Arc<dyn LlmClient>) -> Result<Self> {
        Ok(Self {
            agent,
            llm,
            applier: Box::new(RecordOnly),
            prompts: PromptEngine::new()?,
        })
    }

    pub fn with_applier(mut self, applier: Box<dyn ImprovementApplier>) -> Self {
        self.applier = applier;
        self
    }

    pub fn agent(&self) -> &TestAgent {
        &self.agent
    }

    #[instrument(skip_all, fields(strategy = ?config.strategy, max_attempts = config.max_attempts))]
    pub async fn run(
        &self,
        requirements: &Value,
        files: &FileMap,
        provider: &str,
        output_path: &Path,
        config: &TestingConfig,
    ) -> Result<WorkflowReport> {
        let max_attempts = config.max_attempts.max(1);
        let mut current = files.clone();
        let mut attempts = Vec::new();
        let mut suggestions = Vec::new();
        let mut analysis = TestAnalysis::default();

        for attempt in 1..=max_attempts {
            analysis = self
                .agent
                .analyze_and_test_code(requirements, &current, provider, output_path)
                .await;
            attempts.push(AttemptRecord {
                attempt,
                success: analysis.success,
                test_files: analysis.test_files.len(),
                failures: analysis.failures.len(),
            });
            info!(attempt, success = analysis.success, "testing attempt finished");

            let last = attempt == max_attempts || config.fail_fast || !config.retry_failed_tests;
            if analysis.success || last {
                break;
            }

            let proposed = self
                .request_suggestions(attempt, &analysis, &current, provider)
                .await;
            current = self.applier.apply(&current, &proposed)?;
            suggestions.extend(proposed);
        }

        let final_success = analysis.success;
        let summary = if final_success {
            format!("Testing succeeded after {} attempt(s)", attempts.len())
        } else {
            format!(
                "Testing failed after {} attempt(s) with {} failure(s)",
                attempts.len(),
                analysis.failures.len()
            )
        };
        let report = WorkflowReport {
            config: config.clone(),
            coverage: CoverageView::from_analysis(&analysis),
            attempts,
            final_success,
            final_analysis: analysis,
            suggestions,
            summary,
        };

        if config.generate_reports {
            let path = output_path.join(REPORT_FILE_NAME);
            if let Err(err) = write_json(&path, &report) {
                warn!(path = %path.display(), err = %format!("{err:#}"), "could not write testing report");
            }
        }
        Ok(report)
    }

    async fn request_suggestions(
        &self,
        attempt: u32,
        analysis: &TestAnalysis,
        files: &FileMap,
        provider: &str,
    ) -> Vec<ImprovementSuggestion> {
        let code = excerpts(files, |_| true);
        let prompt = match self
            .prompts
            .render_improvements(attempt, &analysis.failures, &code)
        {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "could not render improvement prompt");
                return vec![ImprovementSuggestion::manual_review()];
            }
        };
        match self
            .llm
            .generate(provider, &prompt, IMPROVEMENT_SYSTEM_PROMPT)
            .await
        {
            Ok(reply) => parse_suggestions(&reply),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "improvement request failed");
                vec![ImprovementSuggestion::manual_review()]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::testing_env::EnvironmentSettings;
    use crate::test_support::{ScriptedCommandRunner, ScriptedLlm, exit_output, file_map};

    const BACKEND_TESTS: &str = "<file path=\"tests/test_main.py\">def test_ok():\n    assert True</file>";
    const SUGGESTIONS: &str = r#"Sure:
{"suggestions": [{"file": "main.py", "description": "return the right value", "priority": "high", "modification_type": "fix"}]}"#;

    fn workflow(llm: ScriptedLlm, runner: ScriptedCommandRunner) -> TestingWorkflow {
        let llm = Arc::new(llm);
        let agent = TestAgent::new(llm.clone(), Arc::new(runner), EnvironmentSettings::default())
            .expect("agent");
        TestingWorkflow::new(agent, llm).expect("workflow")
    }

    #[test]
    fn parses_suggestions_inside_prose() {
        let parsed = parse_suggestions(SUGGESTIONS);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].file, "main.py");
        assert_eq!(parsed[0].priority, "high");
    }

    #[test]
    fn unparseable_reply_falls_back_to_manual_review() {
        assert_eq!(
            parse_suggestions("I think you should fix the tests."),
            vec![ImprovementSuggestion::manual_review()]
        );
        assert_eq!(
            parse_suggestions(r#"{"suggestions": []}"#),
            vec![ImprovementSuggestion::manual_review()]
        );
    }

    #[tokio::test]
    async fn retries_until_attempts_exhausted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let llm = ScriptedLlm::new()
            .respond("pytest tests", BACKEND_TESTS)
            .respond("Suggest concrete code changes", SUGGESTIONS);
        let runner = ScriptedCommandRunner::new().respond("-m pytest", exit_output(1, "fail"));
        let workflow = workflow(llm, runner);
        let files = file_map(&[("main.py", "def f():\n    return 0")]);

        let report = workflow
            .run(
                &serde_json::json!({}),
                &files,
                "local",
                temp.path(),
                &TestingConfig::thorough(),
            )
            .await
            .expect("run");
        assert_eq!(report.attempts.len(), 3);
        assert!(!report.final_success);
        // Suggestions are requested between attempts only.
        assert_eq!(report.suggestions.len(), 2);
        assert!(report.summary.starts_with("Testing failed after 3 attempt(s)"));
        assert!(temp.path().join(REPORT_FILE_NAME).is_file());
    }

    #[tokio::test]
    async fn stops_on_first_success() {
        let temp = tempfile::tempdir().expect("tempdir");
        let llm = ScriptedLlm::new().respond("pytest tests", BACKEND_TESTS);
        let workflow = workflow(llm, ScriptedCommandRunner::new());
        let files = file_map(&[("main.py", "def f():\n    return 1")]);

        let report = workflow
            .run(
                &serde_json::json!({}),
                &files,
                "local",
                temp.path(),
                &TestingConfig::standard(),
            )
            .await
            .expect("run");
        assert_eq!(report.attempts.len(), 1);
        assert!(report.final_success);
        assert!(report.suggestions.is_empty());
        assert_eq!(report.coverage.suites, BTreeSet::from(["backend".to_string()]));
        assert_eq!(report.coverage.recommendations, vec![ADD_E2E_TESTS.to_string()]);
    }

    #[tokio::test]
    async fn quick_strategy_runs_once_without_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let llm = ScriptedLlm::new().respond("pytest tests", BACKEND_TESTS);
        let runner = ScriptedCommandRunner::new().respond("-m pytest", exit_output(1, "fail"));
        let workflow = workflow(llm, runner);
        let files = file_map(&[("main.py", "x = 1")]);

        let report = workflow
            .run(
                &serde_json::json!({}),
                &files,
                "local",
                temp.path(),
                &TestingConfig::quick(),
            )
            .await
            .expect("run");
        assert_eq!(report.attempts.len(), 1);
        assert!(report.suggestions.is_empty());
        assert!(!temp.path().join(REPORT_FILE_NAME).exists());
    }
}
