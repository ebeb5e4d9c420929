//! Generates tests for a code snapshot, runs them in an isolated testing
//! environment and condenses the outcome into one uniform result.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::core::classifier::is_test_file;
use crate::core::requirements::ProjectProfile;
use crate::core::types::{FileMap, SuiteResult, TestFailure, TestResults};
use crate::io::llm::{LlmClient, parse_file_blocks};
use crate::io::process::{CommandRunner, tail_chars};
use crate::io::prompt::{PromptEngine, TEST_SYSTEM_PROMPT, excerpts};
use crate::io::testing_env::{
    EnvironmentSettings, EnvironmentVerification, TestCommandKind, TestingEnvironment,
};
use crate::io::workspace::WorkspaceEnvironment;

pub const BACKEND_SUITE: &str = "backend";
pub const FRONTEND_SUITE: &str = "frontend";

/// Characters of suite stdout/stderr kept in results.
pub const SUITE_OUTPUT_CHARS: usize = 1000;

const FRONTEND_SOURCE_EXTENSIONS: &[&str] = &[".js", ".jsx", ".ts", ".tsx"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestSummary {
    pub total_tests: usize,
    pub failures_count: usize,
    pub passed: bool,
}

/// Result of [`TestAgent::analyze_and_test_code`]. Errors are folded into
/// this shape, never raised.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestAnalysis {
    pub test_files: FileMap,
    pub test_results: TestResults,
    pub failures: Vec<TestFailure>,
    pub success: bool,
    pub summary: TestSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentVerification>,
}

impl TestAnalysis {
    /// Uniform failure carrying one synthetic entry.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            test_results: TestResults {
                success: false,
                ..TestResults::default()
            },
            failures: vec![TestFailure {
                kind: "analysis".to_string(),
                error: message,
                details: None,
            }],
            summary: TestSummary {
                total_tests: 0,
                failures_count: 1,
                passed: false,
            },
            ..Self::default()
        }
    }

    /// One line per failure, used as feedback for the next generation.
    pub fn failure_digest(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("[{}] {}", f.kind, f.error))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct TestAgent {
    llm: Arc<dyn LlmClient>,
    runner: Arc<dyn CommandRunner>,
    settings: EnvironmentSettings,
    prompts: PromptEngine,
}

impl TestAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        runner: Arc<dyn CommandRunner>,
        settings: EnvironmentSettings,
    ) -> Result<Self> {
        Ok(Self {
            llm,
            runner,
            settings,
            prompts: PromptEngine::new()?,
        })
    }

    /// Generate tests, run them under `output_path/testing` and collect
    /// failures.
    #[instrument(skip_all, fields(files = code_files.len(), provider = provider))]
    pub async fn analyze_and_test_code(
        &self,
        requirements: &Value,
        code_files: &FileMap,
        provider: &str,
        output_path: &Path,
    ) -> TestAnalysis {
        match self
            .try_analyze(requirements, code_files, provider, output_path)
            .await
        {
            Ok(analysis) => analysis,
            Err(err) => {
                let message = format!("{err:#}");
                error!(err = %message, "test analysis failed");
                TestAnalysis::failed(message)
            }
        }
    }

    async fn try_analyze(
        &self,
        requirements: &Value,
        code_files: &FileMap,
        provider: &str,
        output_path: &Path,
    ) -> Result<TestAnalysis> {
        let test_files = self.generate_tests(requirements, code_files, provider).await?;
        info!(tests = test_files.len(), "generated test files");
        if test_files.is_empty() {
            let mut analysis = TestAnalysis::failed("No test files were generated");
            analysis.failures[0].kind = "generation".to_string();
            return Ok(analysis);
        }

        let mut all_files = code_files.clone();
        all_files.extend(test_files.iter().map(|(p, c)| (p.clone(), c.clone())));
        let workspace = WorkspaceEnvironment::new(output_path);
        let env = workspace
            .prepare_testing_environment(&all_files, self.settings.clone(), self.runner.clone())
            .await?;
        let verification = env.verify_environment().await;

        let test_results = self.run_suites(&env, &test_files).await;
        let failures = extract_failures(&test_results, &verification);
        info!(failures = failures.len(), success = test_results.success, "test run completed");

        Ok(TestAnalysis {
            summary: TestSummary {
                total_tests: test_files.len(),
                failures_count: failures.len(),
                passed: test_results.success,
            },
            success: test_results.success,
            test_files,
            test_results,
            failures,
            environment: Some(verification),
        })
    }

    /// Ask for pytest tests for Python sources and Jest tests for JS/TS
    /// sources. A failed request yields no tests for that suite.
    pub async fn generate_tests(
        &self,
        requirements: &Value,
        code_files: &FileMap,
        provider: &str,
    ) -> Result<FileMap> {
        let profile = ProjectProfile::from_requirements(requirements);
        let mut tests = FileMap::new();

        let backend = excerpts(code_files, |p| p.ends_with(".py") && !is_test_file(p));
        if !backend.is_empty() {
            let prompt = self.prompts.render_backend_tests(&profile, &backend)?;
            tests.extend(self.request_tests(BACKEND_SUITE, provider, &prompt).await?);
        }

        let frontend = excerpts(code_files, |p| is_frontend_source(p) && !is_test_file(p));
        if !frontend.is_empty() {
            let react = frontend
                .iter()
                .any(|e| e.path.ends_with(".jsx") || e.path.ends_with(".tsx"));
            let prompt = self.prompts.render_frontend_tests(&profile, &frontend, react)?;
            tests.extend(self.request_tests(FRONTEND_SUITE, provider, &prompt).await?);
        }
        Ok(tests)
    }

    async fn request_tests(&self, suite: &str, provider: &str, prompt: &str) -> Result<FileMap> {
        match self.llm.generate(provider, prompt, TEST_SYSTEM_PROMPT).await {
            Ok(reply) => parse_file_blocks(&reply),
            Err(err) => {
                warn!(suite, err = %format!("{err:#}"), "test generation failed");
                Ok(FileMap::new())
            }
        }
    }

    async fn run_suites(&self, env: &TestingEnvironment, test_files: &FileMap) -> TestResults {
        let eco = env.ecosystems();
        let has_backend_tests = test_files.keys().any(|p| p.ends_with(".py"));
        let has_frontend_tests = test_files.keys().any(|p| is_frontend_source(p));
        let plan = [
            (BACKEND_SUITE, eco.python && has_backend_tests, TestCommandKind::Python),
            (FRONTEND_SUITE, eco.node && has_frontend_tests, TestCommandKind::Node),
        ];

        let mut results = TestResults::default();
        for (suite, applies, kind) in plan {
            if !applies {
                continue;
            }
            let outcome = self.run_suite(env, kind).await;
            results.suites.insert(suite.to_string(), outcome);
        }
        results.success = !results.is_empty() && results.suites.values().all(|s| s.success);
        results
    }

    async fn run_suite(&self, env: &TestingEnvironment, kind: TestCommandKind) -> SuiteResult {
        if !env.deps_setup_complete() {
            let reason = env.setup_error().map_or_else(
                || "dependency setup incomplete".to_string(),
                |e| e.to_string(),
            );
            return SuiteResult::failed(format!("tests not run: {reason}"));
        }
        match env.run_test_command(kind).await {
            None => SuiteResult::failed("no test command for this ecosystem"),
            Some(Err(err)) => SuiteResult::failed(format!("could not run tests: {err:#}")),
            Some(Ok(output)) => {
                let success = output.success();
                let message = if output.timed_out {
                    format!(
                        "tests timed out after {}s",
                        self.settings.timeouts.test_run
                    )
                } else if success {
                    "tests passed".to_string()
                } else {
                    match output.exit_code {
                        Some(code) => format!("tests failed with exit code {code}"),
                        None => "tests terminated without an exit code".to_string(),
                    }
                };
                SuiteResult {
                    success,
                    message,
                    exit_code: output.exit_code,
                    timed_out: output.timed_out,
                    stdout: tail_chars(&output.stdout_text(), SUITE_OUTPUT_CHARS),
                    stderr: tail_chars(&output.stderr_text(), SUITE_OUTPUT_CHARS),
                }
            }
        }
    }
}

fn is_frontend_source(path: &str) -> bool {
    FRONTEND_SOURCE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// One failure per failed suite, plus environment issues when the
/// environment was not ready.
pub fn extract_failures(
    results: &TestResults,
    verification: &EnvironmentVerification,
) -> Vec<TestFailure> {
    let mut failures: Vec<TestFailure> = results
        .suites
        .iter()
        .filter(|(_, suite)| !suite.success)
        .map(|(kind, suite)| TestFailure {
            kind: kind.clone(),
            error: suite.message.clone(),
            details: (!suite.stderr.trim().is_empty()).then(|| suite.stderr.clone()),
        })
        .collect();
    if !verification.overall_ready {
        failures.extend(verification.issues.iter().map(|issue| TestFailure {
            kind: "environment".to_string(),
            error: issue.clone(),
            details: None,
        }));
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        ScriptedCommandRunner, ScriptedLlm, exit_output, file_map, ok_output, timed_out_output,
    };

    const BACKEND_TESTS: &str = "<file path=\"tests/test_main.py\">def test_ok():\n    assert True</file>";
    const FRONTEND_TESTS: &str =
        "<file path=\"src/__tests__/App.test.jsx\">test('renders', () => {});</file>";

    fn agent(llm: ScriptedLlm, runner: ScriptedCommandRunner) -> TestAgent {
        TestAgent::new(Arc::new(llm), Arc::new(runner), EnvironmentSettings::default())
            .expect("agent")
    }

    fn fullstack_files() -> FileMap {
        file_map(&[
            ("backend/main.py", "def handler():\n    return 1"),
            ("frontend/src/App.jsx", "export default function App() { return null; }"),
            ("requirements.txt", "pytest"),
        ])
    }

    #[tokio::test]
    async fn passing_suites_report_success() {
        let temp = tempfile::tempdir().expect("tempdir");
        let llm = ScriptedLlm::new()
            .respond("pytest tests", BACKEND_TESTS)
            .respond("Jest tests", FRONTEND_TESTS);
        let runner = ScriptedCommandRunner::new().respond("-m pytest", ok_output("2 passed"));
        let analysis = agent(llm, runner)
            .analyze_and_test_code(&serde_json::json!({}), &fullstack_files(), "local", temp.path())
            .await;

        assert!(analysis.success, "{:?}", analysis.failures);
        assert_eq!(analysis.test_files.len(), 2);
        assert_eq!(analysis.summary.total_tests, 2);
        assert_eq!(analysis.summary.failures_count, 0);
        assert!(analysis.test_results.suites[BACKEND_SUITE].success);
        assert!(analysis.test_results.suites[FRONTEND_SUITE].success);
        assert!(temp.path().join("testing/tests/test_main.py").is_file());
        assert!(temp.path().join("testing/backend/main.py").is_file());
    }

    #[tokio::test]
    async fn failing_suite_is_extracted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let llm = ScriptedLlm::new().respond("pytest tests", BACKEND_TESTS);
        let runner = ScriptedCommandRunner::new().respond("-m pytest", exit_output(1, "AssertionError"));
        let files = file_map(&[("main.py", "x = 1")]);
        let analysis = agent(llm, runner)
            .analyze_and_test_code(&serde_json::json!({}), &files, "local", temp.path())
            .await;

        assert!(!analysis.success);
        assert_eq!(analysis.failures.len(), 1);
        assert_eq!(analysis.failures[0].kind, BACKEND_SUITE);
        assert_eq!(analysis.failures[0].error, "tests failed with exit code 1");
        assert_eq!(analysis.failures[0].details.as_deref(), Some("AssertionError"));
        assert!(!analysis.summary.passed);
    }

    #[tokio::test]
    async fn untrusted_environment_skips_execution() {
        let temp = tempfile::tempdir().expect("tempdir");
        let llm = ScriptedLlm::new().respond("pytest tests", BACKEND_TESTS);
        let runner = ScriptedCommandRunner::new().respond("-m venv", timed_out_output());
        let files = file_map(&[("main.py", "x = 1")]);
        let agent = agent(llm, runner);
        let analysis = agent
            .analyze_and_test_code(&serde_json::json!({}), &files, "local", temp.path())
            .await;

        assert!(!analysis.success);
        let suite = &analysis.test_results.suites[BACKEND_SUITE];
        assert!(suite.message.starts_with("tests not run:"));
        assert!(suite.message.contains("python_venv"));
        assert!(analysis.failures.iter().any(|f| f.kind == "environment"));
    }

    #[tokio::test]
    async fn no_generated_tests_is_a_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let llm = ScriptedLlm::new().fail("pytest tests", "rate limited");
        let files = file_map(&[("main.py", "x = 1")]);
        let analysis = agent(llm, ScriptedCommandRunner::new())
            .analyze_and_test_code(&serde_json::json!({}), &files, "local", temp.path())
            .await;

        assert!(!analysis.success);
        assert_eq!(analysis.failures.len(), 1);
        assert_eq!(analysis.failures[0].kind, "generation");
        assert_eq!(analysis.summary.failures_count, 1);
        assert_eq!(analysis.summary.total_tests, 0);
    }

    #[tokio::test]
    async fn internal_errors_become_failure_results() {
        let temp = tempfile::tempdir().expect("tempdir");
        // A file where the workspace directory should be makes writing fail.
        let blocker = temp.path().join("blocked");
        std::fs::write(&blocker, "not a directory").expect("blocker");
        let llm = ScriptedLlm::new().respond("pytest tests", BACKEND_TESTS);
        let files = file_map(&[("main.py", "x = 1")]);
        let analysis = agent(llm, ScriptedCommandRunner::new())
            .analyze_and_test_code(&serde_json::json!({}), &files, "local", &blocker)
            .await;

        assert!(!analysis.success);
        assert_eq!(analysis.failures.len(), 1);
        assert_eq!(analysis.failures[0].kind, "analysis");
        assert_eq!(
            analysis.summary,
            TestSummary {
                total_tests: 0,
                failures_count: 1,
                passed: false
            }
        );
    }

    #[test]
    fn digest_lists_failures() {
        let analysis = TestAnalysis::failed("boom");
        assert_eq!(analysis.failure_digest(), "[analysis] boom");
    }
}
