//! Iterative generate, place, test and record loop for one project.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::agents::generator::{CodeSource, GenerationRequest};
use crate::agents::test_agent::{BACKEND_SUITE, FRONTEND_SUITE, TestAgent, TestAnalysis};
use crate::agents::workflow::{TestingWorkflow, WorkflowReport};
use crate::core::classifier::{TESTS_DIR, organize_files, test_destination};
use crate::core::requirements::{ProjectProfile, requirements_text};
use crate::core::strategy::select_strategy;
use crate::core::types::{FileMap, IterationResult, IterationStatus, TestFailure, TestResults};
use crate::io::config::PipelineConfig;
use crate::io::fs::safe_join;
use crate::io::llm::LlmClient;
use crate::io::output::{FinalCodeDecision, FinalSummary, OutputManager};
use crate::io::process::CommandRunner;
use crate::io::structure::{ProjectStructure, StructureManager, UnifiedSaveReport};
use crate::io::testing_env::EnvironmentSettings;

/// Reason why [`Pipeline::run`] stopped iterating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LoopStop {
    /// An iteration finished with status `success`.
    Succeeded { iteration: u32 },
    /// `max_iterations` passes ran without success.
    MaxIterationsReached { max_iterations: u32 },
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub structure: ProjectStructure,
    pub iterations: Vec<IterationResult>,
    pub stop: LoopStop,
    pub final_status: IterationStatus,
    pub final_summary: FinalSummary,
}

/// Everything persisted per iteration under `.reports/iteration_<n>.json`.
#[derive(Debug, Serialize)]
struct IterationReport<'a> {
    result: &'a IterationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    persistence_error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved: Option<&'a UnifiedSaveReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    testing: Option<&'a WorkflowReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_code: Option<&'a FinalCodeDecision>,
}

/// Per-run inputs shared by every iteration's placement step.
struct Placement<'a> {
    structure: &'a ProjectStructure,
    output: &'a OutputManager,
    requirements: &'a Value,
    profile: &'a ProjectProfile,
    project_name: &'a str,
    requirements_text: &'a str,
}

struct PlacedIteration {
    saved: UnifiedSaveReport,
    testing: Option<WorkflowReport>,
    decision: FinalCodeDecision,
}

pub struct Pipeline {
    config: PipelineConfig,
    structure: StructureManager,
    code_source: Arc<dyn CodeSource>,
    workflow: TestingWorkflow,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        code_source: Arc<dyn CodeSource>,
        llm: Arc<dyn LlmClient>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let agent = TestAgent::new(llm.clone(), runner, EnvironmentSettings::from_config(&config))?;
        Ok(Self {
            structure: StructureManager::new(&config.output_root),
            workflow: TestingWorkflow::new(agent, llm)?,
            code_source,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run iterations until one succeeds or `max_iterations` is reached,
    /// then finalize. Iteration failures are recorded, not returned.
    #[instrument(skip_all, fields(project_id = project_id))]
    pub async fn run<F: FnMut(&IterationResult)>(
        &self,
        requirements: &Value,
        project_id: &str,
        project_name: &str,
        mut on_iteration: F,
    ) -> Result<PipelineOutcome> {
        let structure = self
            .structure
            .create_project_structure(project_id, project_name)?;
        self.structure.save_project_metadata(
            &structure,
            &json!({
                "project_id": project_id,
                "project_name": structure.project_name,
                "created_at": Utc::now().to_rfc3339(),
                "provider": self.config.provider,
                "testing_mode": self.config.testing_mode,
                "max_iterations": self.config.max_iterations,
                "requirements": requirements,
            }),
        )?;
        let output = OutputManager::new(&structure.base_path)?;
        let profile = ProjectProfile::from_requirements(requirements);
        let text = requirements_text(requirements);
        let placement = Placement {
            structure: &structure,
            output: &output,
            requirements,
            profile: &profile,
            project_name,
            requirements_text: &text,
        };

        let mut iterations: Vec<IterationResult> = Vec::new();
        let mut feedback: Option<String> = None;
        let mut stop = LoopStop::MaxIterationsReached {
            max_iterations: self.config.max_iterations,
        };

        for iteration in 1..=self.config.max_iterations {
            let started = Instant::now();
            let current = self
                .structure
                .get_current_source_files(&structure)
                .unwrap_or_else(|err| {
                    warn!(iteration, err = %format!("{err:#}"), "could not read current source files");
                    FileMap::new()
                });
            let request = GenerationRequest {
                requirements,
                iteration,
                provider: &self.config.provider,
                current_files: &current,
                feedback: feedback.as_deref(),
            };

            let raw = match self.code_source.generate(&request).await {
                Ok(files) => files,
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!(iteration, err = %message, "code generation failed");
                    let result = generation_failure(iteration, started);
                    self.save_report(&structure, &IterationReport {
                        result: &result,
                        generation_error: Some(&message),
                        persistence_error: None,
                        saved: None,
                        testing: None,
                        final_code: None,
                    });
                    output.log_iteration(&result);
                    on_iteration(&result);
                    iterations.push(result);
                    feedback = Some(format!("Code generation failed: {message}"));
                    continue;
                }
            };

            let (raw, unsafe_paths) = split_unsafe_paths(raw);
            if !unsafe_paths.is_empty() {
                warn!(iteration, paths = ?unsafe_paths, "dropping generated files outside the project");
            }
            let placed = match self.place_and_test(&placement, &raw, iteration).await {
                Ok(placed) => placed,
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!(iteration, err = %message, "could not persist iteration");
                    let result = IterationResult {
                        compilation_success: true,
                        validation_errors: unsafe_paths.len() as u32,
                        code_files_count: raw.len(),
                        ..generation_failure(iteration, started)
                    };
                    self.save_report(&structure, &IterationReport {
                        result: &result,
                        generation_error: None,
                        persistence_error: Some(&message),
                        saved: None,
                        testing: None,
                        final_code: None,
                    });
                    output.log_iteration(&result);
                    on_iteration(&result);
                    iterations.push(result);
                    continue;
                }
            };
            let analysis = placed.testing.as_ref().map(|t| &t.final_analysis);

            let status = match analysis {
                None => IterationStatus::Success,
                Some(a) if a.success => IterationStatus::Success,
                Some(_) => IterationStatus::Partial,
            };
            let saved = &placed.saved;
            let result = IterationResult {
                iteration,
                status,
                validation_errors: (unsafe_paths.len() + saved.source.rejected.len()) as u32,
                compilation_success: true,
                test_results: analysis.map(|a| a.test_results.clone()).unwrap_or_default(),
                code_files_count: saved.source.files_created + saved.source.files_modified,
                test_files_count: analysis.map_or(0, |a| a.test_files.len()),
                duration: started.elapsed().as_secs_f64(),
                errors_fixed: errors_fixed(iterations.last(), analysis),
                improvements: improvements(status, analysis),
                timestamp: Utc::now().to_rfc3339(),
            };

            self.save_report(&structure, &IterationReport {
                result: &result,
                generation_error: None,
                persistence_error: None,
                saved: Some(saved),
                testing: placed.testing.as_ref(),
                final_code: Some(&placed.decision),
            });
            output.log_iteration(&result);
            on_iteration(&result);
            info!(iteration, status = %result.status, "iteration finished");

            feedback = analysis
                .filter(|a| !a.success)
                .map(TestAnalysis::failure_digest);
            iterations.push(result);
            if status == IterationStatus::Success {
                stop = LoopStop::Succeeded { iteration };
                break;
            }
        }

        let final_status = iterations
            .last()
            .map_or(IterationStatus::Failed, |r| r.status);
        let final_results = json!({
            "status": final_status,
            "total_iterations": iterations.len(),
            "stop": stop,
            "testing_mode": self.config.testing_mode,
            "provider": self.config.provider,
        });
        let finalized = output.finalize_project(&final_results)?;
        self.structure.create_final_report(&structure, &final_results)?;

        Ok(PipelineOutcome {
            structure,
            iterations,
            stop,
            final_status,
            final_summary: finalized.final_summary,
        })
    }

    /// Save one generation into the workspace and the project tree, test it
    /// when the testing mode asks for it, then offer it as the final code.
    async fn place_and_test(
        &self,
        placement: &Placement<'_>,
        raw: &FileMap,
        iteration: u32,
    ) -> Result<PlacedIteration> {
        let workspace = placement.output.create_workspace()?;
        workspace.save_generated_code(raw)?;
        let organized = organize_files(raw, placement.profile, placement.project_name);
        let saved = self
            .structure
            .save_to_unified_structure(placement.structure, &organized, iteration)?;

        let testing = match select_strategy(self.config.testing_mode, raw, placement.requirements_text) {
            Some(testing_config) => Some(
                self.workflow
                    .run(
                        placement.requirements,
                        raw,
                        &self.config.provider,
                        workspace.root(),
                        &testing_config,
                    )
                    .await?,
            ),
            None => None,
        };
        let analysis = testing.as_ref().map(|t| &t.final_analysis);
        if let Some(analysis) = analysis
            && let Err(err) = self
                .structure
                .save_test_files(placement.structure, &analysis.test_files)
        {
            warn!(iteration, err = %format!("{err:#}"), "could not save generated tests");
        }

        let mut candidate = organized;
        if let Some(analysis) = analysis {
            candidate.extend(
                analysis
                    .test_files
                    .iter()
                    .map(|(path, content)| (format!("{TESTS_DIR}/{}", test_destination(path)), content.clone())),
            );
        }
        let decision = placement.output.update_final_code(&candidate, iteration, false)?;

        Ok(PlacedIteration {
            saved,
            testing,
            decision,
        })
    }

    fn save_report(&self, structure: &ProjectStructure, report: &IterationReport<'_>) {
        let iteration = report.result.iteration;
        if let Err(err) = self
            .structure
            .save_iteration_report(structure, iteration, report)
        {
            warn!(iteration, err = %format!("{err:#}"), "could not save iteration report");
        }
    }
}

/// Separate generated paths that would escape the project directory.
fn split_unsafe_paths(files: FileMap) -> (FileMap, Vec<String>) {
    let mut rejected = Vec::new();
    let safe = files
        .into_iter()
        .filter(|(path, _)| {
            let ok = safe_join(Path::new("."), path).is_ok();
            if !ok {
                rejected.push(path.clone());
            }
            ok
        })
        .collect();
    (safe, rejected)
}

fn generation_failure(iteration: u32, started: Instant) -> IterationResult {
    IterationResult {
        iteration,
        status: IterationStatus::Failed,
        validation_errors: 0,
        compilation_success: false,
        test_results: TestResults::default(),
        code_files_count: 0,
        test_files_count: 0,
        duration: started.elapsed().as_secs_f64(),
        errors_fixed: Vec::new(),
        improvements: Vec::new(),
        timestamp: Utc::now().to_rfc3339(),
    }
}

/// Failures of the previous iteration that no longer occur.
fn errors_fixed(previous: Option<&IterationResult>, analysis: Option<&TestAnalysis>) -> Vec<String> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    let current: Vec<&TestFailure> = analysis.map(|a| a.failures.iter().collect()).unwrap_or_default();
    let mut fixed: Vec<String> = previous
        .test_results
        .suites
        .iter()
        .filter(|(_, suite)| !suite.success)
        .filter(|(kind, _)| !current.iter().any(|f| &f.kind == *kind))
        .map(|(kind, suite)| format!("{kind} tests: {}", suite.message))
        .collect();
    if !previous.compilation_success {
        fixed.push("Code generation recovered".to_string());
    }
    fixed
}

fn improvements(status: IterationStatus, analysis: Option<&TestAnalysis>) -> Vec<String> {
    let mut notes = Vec::new();
    if status == IterationStatus::Success {
        notes.push("Iteration completed successfully".to_string());
    }
    let Some(analysis) = analysis else {
        return notes;
    };
    for (suite, label) in [(BACKEND_SUITE, "Backend"), (FRONTEND_SUITE, "Frontend")] {
        if analysis.test_results.suites.get(suite).is_some_and(|s| s.success) {
            notes.push(format!("{label} tests passing"));
        }
    }
    if analysis.environment.as_ref().is_some_and(|e| e.overall_ready) {
        notes.push("Testing environment properly configured".to_string());
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SuiteResult;

    fn previous(failed_suite: &str, compiled: bool) -> IterationResult {
        let mut test_results = TestResults::default();
        test_results
            .suites
            .insert(failed_suite.to_string(), SuiteResult::failed("tests failed with exit code 1"));
        IterationResult {
            iteration: 1,
            status: IterationStatus::Partial,
            validation_errors: 0,
            compilation_success: compiled,
            test_results,
            code_files_count: 1,
            test_files_count: 1,
            duration: 1.0,
            errors_fixed: Vec::new(),
            improvements: Vec::new(),
            timestamp: "t".to_string(),
        }
    }

    #[test]
    fn fixed_errors_are_previous_failures_that_disappeared() {
        let prev = previous(BACKEND_SUITE, true);
        let now = TestAnalysis {
            success: true,
            ..TestAnalysis::default()
        };
        assert_eq!(
            errors_fixed(Some(&prev), Some(&now)),
            vec!["backend tests: tests failed with exit code 1".to_string()]
        );

        let still_failing = TestAnalysis {
            failures: vec![TestFailure {
                kind: BACKEND_SUITE.to_string(),
                error: "again".to_string(),
                details: None,
            }],
            ..TestAnalysis::default()
        };
        assert!(errors_fixed(Some(&prev), Some(&still_failing)).is_empty());
        assert!(errors_fixed(None, Some(&now)).is_empty());
    }

    #[test]
    fn improvements_name_passing_suites() {
        let mut analysis = TestAnalysis {
            success: true,
            ..TestAnalysis::default()
        };
        analysis.test_results.suites.insert(
            FRONTEND_SUITE.to_string(),
            SuiteResult {
                success: true,
                ..SuiteResult::default()
            },
        );
        assert_eq!(
            improvements(IterationStatus::Success, Some(&analysis)),
            vec![
                "Iteration completed successfully".to_string(),
                "Frontend tests passing".to_string()
            ]
        );
        assert!(improvements(IterationStatus::Partial, None).is_empty());
    }

    #[test]
    fn escaping_paths_are_split_off() {
        let files = FileMap::from([
            ("app.py".to_string(), "a".to_string()),
            ("../outside.py".to_string(), "b".to_string()),
            ("/etc/passwd".to_string(), "c".to_string()),
        ]);
        let (safe, rejected) = split_unsafe_paths(files);
        assert_eq!(safe.keys().collect::<Vec<_>>(), vec!["app.py"]);
        assert_eq!(rejected, vec!["../outside.py".to_string(), "/etc/passwd".to_string()]);
    }
}
