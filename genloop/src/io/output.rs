//! Final-tree ownership and durable run history for one project.
//!
//! Layout under the project directory:
//! - `workspace/` per-iteration scratch space, removed on finalize
//! - `final/` accepted source tree
//! - `logs/` `iterations.log` plus the three JSON history stores
//! - `reports/` end-of-run summary, quality report and README
//!
//! History stores are rewritten in full on every append with their
//! aggregates recomputed from the complete entry list.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use minijinja::{Environment, context};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::history::{ErrorEvolution, PerformanceStats, TestHistory};
use crate::core::quality::{
    file_diversity, has_config_files, has_organized_structure, has_test_files, quality_score,
};
use crate::core::recommendations::{
    ConsolidatedStats, TreeSignals, error_resolution_rate, quality_recommendations,
};
use crate::core::types::{FileMap, IterationResult};
use crate::io::fs::{append_text, count_files, read_tree, remove_dir_if_exists, write_atomic, write_json, write_tree};
use crate::io::workspace::WorkspaceEnvironment;

const README_TEMPLATE: &str = include_str!("templates/reports_readme.md");

/// Final trees with more files than this count as organized in the summary.
const ORGANIZED_FILE_COUNT: usize = 5;

/// Paths owned by an [`OutputManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub project: PathBuf,
    pub workspace: PathBuf,
    pub final_code: PathBuf,
    pub logs: PathBuf,
    pub reports: PathBuf,
}

impl OutputPaths {
    pub fn new(project: &Path) -> Self {
        Self {
            project: project.to_path_buf(),
            workspace: project.join("workspace"),
            final_code: project.join("final"),
            logs: project.join("logs"),
            reports: project.join("reports"),
        }
    }

    pub fn iterations_log(&self) -> PathBuf {
        self.logs.join("iterations.log")
    }

    pub fn test_history(&self) -> PathBuf {
        self.logs.join("test_history.json")
    }

    pub fn error_evolution(&self) -> PathBuf {
        self.logs.join("error_evolution.json")
    }

    pub fn performance_stats(&self) -> PathBuf {
        self.logs.join("performance_stats.json")
    }

    pub fn final_summary(&self) -> PathBuf {
        self.reports.join("final_summary.json")
    }

    pub fn quality_report(&self) -> PathBuf {
        self.reports.join("quality_report.json")
    }

    pub fn readme(&self) -> PathBuf {
        self.reports.join("README.md")
    }
}

/// Scores compared by a non-forced update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityComparison {
    pub current: f64,
    pub candidate: f64,
}

/// Outcome of [`OutputManager::update_final_code`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum FinalCodeDecision {
    /// `comparison` is absent for forced updates and the first accepted tree.
    Replaced {
        iteration: u32,
        files: usize,
        comparison: Option<QualityComparison>,
    },
    Skipped {
        iteration: u32,
        comparison: QualityComparison,
    },
}

impl FinalCodeDecision {
    pub fn replaced(&self) -> bool {
        matches!(self, Self::Replaced { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalOutput {
    pub files_count: usize,
    pub final_path: String,
    pub logs_path: String,
    pub reports_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityAssessment {
    pub final_code_quality: f64,
    pub structure_organized: bool,
    pub has_tests: bool,
    pub has_config: bool,
}

/// `reports/final_summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalSummary {
    pub project_completed_at: String,
    pub project_id: String,
    pub generation_results: Value,
    pub statistics: ConsolidatedStats,
    pub final_output: FinalOutput,
    pub quality_assessment: QualityAssessment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeQuality {
    pub final_score: f64,
    pub has_organized_structure: bool,
    pub has_tests: bool,
    pub has_configuration: bool,
    pub file_diversity: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationQuality {
    pub iterations_efficiency: f64,
    pub error_resolution_rate: f64,
    pub average_iteration_time: f64,
    pub files_generation_rate: f64,
}

/// `reports/quality_report.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    pub generated_at: String,
    pub code_quality: CodeQuality,
    pub generation_quality: GenerationQuality,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeOutcome {
    pub final_summary: FinalSummary,
    pub quality_report: QualityReport,
    pub final_path: PathBuf,
    pub logs_path: PathBuf,
    pub reports_path: PathBuf,
}

pub struct OutputManager {
    project_id: String,
    paths: OutputPaths,
}

impl OutputManager {
    /// Create the log and report directories, drop any stale workspace and
    /// initialize the history files that do not exist yet.
    pub fn new(project_path: &Path) -> Result<Self> {
        let paths = OutputPaths::new(project_path);
        for dir in [&paths.logs, &paths.reports] {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        remove_dir_if_exists(&paths.workspace)?;

        let project_id = project_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let manager = Self { project_id, paths };
        manager.initialize_logs()?;
        Ok(manager)
    }

    fn initialize_logs(&self) -> Result<()> {
        let log = self.paths.iterations_log();
        if !log.exists() {
            let header = format!(
                "=== PROJECT GENERATION LOG ===\nStarted: {}\nProject: {}\n\n",
                Utc::now().to_rfc3339(),
                self.project_id
            );
            write_atomic(&log, &header)?;
        }
        if !self.paths.test_history().exists() {
            write_json(&self.paths.test_history(), &TestHistory::default())?;
        }
        if !self.paths.error_evolution().exists() {
            write_json(&self.paths.error_evolution(), &ErrorEvolution::default())?;
        }
        Ok(())
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Fresh workspace for the next iteration.
    pub fn create_workspace(&self) -> Result<WorkspaceEnvironment> {
        let workspace = WorkspaceEnvironment::new(&self.paths.workspace);
        workspace.clean_and_prepare()?;
        Ok(workspace)
    }

    pub fn final_files(&self) -> Result<FileMap> {
        read_tree(&self.paths.final_code)
    }

    /// Replace the final tree when forced, when none exists yet, or when
    /// the candidate scores at least as well as the current tree.
    #[instrument(skip_all, fields(iteration = iteration, files = files.len(), force = force))]
    pub fn update_final_code(
        &self,
        files: &FileMap,
        iteration: u32,
        force: bool,
    ) -> Result<FinalCodeDecision> {
        let final_dir = &self.paths.final_code;
        let comparison = if !force && final_dir.exists() {
            let comparison = QualityComparison {
                current: quality_score(&self.final_files()?),
                candidate: quality_score(files),
            };
            info!(
                current = comparison.current,
                candidate = comparison.candidate,
                "compared final code quality"
            );
            if comparison.candidate < comparison.current {
                info!(iteration, "kept existing final code, quality did not improve");
                return Ok(FinalCodeDecision::Skipped {
                    iteration,
                    comparison,
                });
            }
            Some(comparison)
        } else {
            None
        };

        remove_dir_if_exists(final_dir)?;
        fs::create_dir_all(final_dir)
            .with_context(|| format!("create {}", final_dir.display()))?;
        write_tree(final_dir, files)?;
        info!(iteration, files = files.len(), "updated final code");

        let marker = format!(
            "\n>>> FINAL CODE UPDATED from iteration {iteration} ({} files) <<<\n",
            files.len()
        );
        if let Err(err) = append_text(&self.paths.iterations_log(), &marker) {
            warn!(path = %self.paths.iterations_log().display(), err = %format!("{err:#}"), "could not log final code update");
        }

        Ok(FinalCodeDecision::Replaced {
            iteration,
            files: files.len(),
            comparison,
        })
    }

    /// Append one iteration to the text log and the three JSON stores.
    ///
    /// Each artifact is written independently. Failures are logged and
    /// returned as messages; they never stop the remaining writes.
    #[instrument(skip_all, fields(iteration = result.iteration))]
    pub fn log_iteration(&self, result: &IterationResult) -> Vec<String> {
        let writes: [(&str, Result<()>); 4] = [
            (
                "iterations.log",
                append_text(&self.paths.iterations_log(), &iteration_block(result)),
            ),
            (
                "test_history.json",
                self.update_store(&self.paths.test_history(), |h: &mut TestHistory| h.record(result)),
            ),
            (
                "error_evolution.json",
                self.update_store(&self.paths.error_evolution(), |e: &mut ErrorEvolution| {
                    e.record(result);
                }),
            ),
            (
                "performance_stats.json",
                self.update_store(&self.paths.performance_stats(), |p: &mut PerformanceStats| {
                    p.record(result);
                }),
            ),
        ];

        let mut failures = Vec::new();
        for (artifact, outcome) in writes {
            if let Err(err) = outcome {
                let message = format!("{artifact}: {err:#}");
                warn!(artifact, err = %message, "could not persist iteration history");
                failures.push(message);
            }
        }
        failures
    }

    fn update_store<T>(&self, path: &Path, update: impl FnOnce(&mut T)) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let mut store: T = load_store(path);
        update(&mut store);
        write_json(path, &store)
    }

    /// The three history stores merged into one view. Unreadable stores
    /// contribute nothing.
    pub fn consolidated_stats(&self) -> ConsolidatedStats {
        ConsolidatedStats::merge(
            &load_store(&self.paths.test_history()),
            &load_store(&self.paths.error_evolution()),
            &load_store(&self.paths.performance_stats()),
        )
    }

    /// Write the end-of-run reports and remove the workspace.
    ///
    /// Everything is recomputed from the durable stores and the final tree,
    /// so repeating the call yields the same reports.
    #[instrument(skip_all, fields(project = %self.project_id))]
    pub fn finalize_project(&self, final_results: &Value) -> Result<FinalizeOutcome> {
        let final_files = self.final_files()?;
        let files_count = count_files(&self.paths.final_code);
        let stats = self.consolidated_stats();
        let signals = TreeSignals {
            has_tests: has_test_files(&final_files),
            has_config: has_config_files(&final_files),
            organized: has_organized_structure(&final_files),
        };
        let score = quality_score(&final_files);
        let completed_at = Utc::now().to_rfc3339();

        let final_summary = FinalSummary {
            project_completed_at: completed_at.clone(),
            project_id: self.project_id.clone(),
            generation_results: final_results.clone(),
            statistics: stats.clone(),
            final_output: FinalOutput {
                files_count,
                final_path: "final".to_string(),
                logs_path: "logs".to_string(),
                reports_path: "reports".to_string(),
            },
            quality_assessment: QualityAssessment {
                final_code_quality: score,
                structure_organized: files_count > ORGANIZED_FILE_COUNT,
                has_tests: signals.has_tests,
                has_config: signals.has_config,
            },
        };
        write_json(&self.paths.final_summary(), &final_summary)?;

        let quality_report = QualityReport {
            generated_at: completed_at.clone(),
            code_quality: CodeQuality {
                final_score: score,
                has_organized_structure: signals.organized,
                has_tests: signals.has_tests,
                has_configuration: signals.has_config,
                file_diversity: file_diversity(&final_files),
            },
            generation_quality: GenerationQuality {
                iterations_efficiency: stats.iterations_efficiency(),
                error_resolution_rate: error_resolution_rate(&stats),
                average_iteration_time: stats.avg_duration(),
                files_generation_rate: stats.avg_files_per_second(),
            },
            recommendations: quality_recommendations(signals, &stats),
        };
        write_json(&self.paths.quality_report(), &quality_report)?;

        let final_status = final_results
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let total_iterations = stats.summary.as_ref().map_or(0, |s| s.total_iterations);
        let readme = render_readme(&ReadmeContext {
            project_id: &self.project_id,
            completed_at: &completed_at,
            final_files: files_count,
            final_status,
            total_iterations,
            quality_score: score,
            recommendations: &quality_report.recommendations,
        })?;
        write_atomic(&self.paths.readme(), &readme)?;

        remove_dir_if_exists(&self.paths.workspace)?;

        let footer = format!(
            "\n=== PROJECT FINALIZED ===\nCompleted: {completed_at}\nFinal Status: {final_status}\nTotal Iterations: {total_iterations}\nFinal Files: {files_count}\nCode Quality Score: {score:.1}/100\n{}\n",
            "=".repeat(50)
        );
        append_text(&self.paths.iterations_log(), &footer)?;
        info!(files = files_count, path = %self.paths.final_code.display(), "project finalized");

        Ok(FinalizeOutcome {
            final_summary,
            quality_report,
            final_path: self.paths.final_code.clone(),
            logs_path: self.paths.logs.clone(),
            reports_path: self.paths.reports.clone(),
        })
    }
}

/// Missing stores start empty. Corrupt stores are reported and restarted.
fn load_store<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    match crate::io::fs::read_json(path) {
        Ok(store) => store,
        Err(err) => {
            warn!(path = %path.display(), err = %format!("{err:#}"), "unreadable history store, starting fresh");
            T::default()
        }
    }
}

/// Human-readable block appended to `iterations.log`.
pub fn iteration_block(result: &IterationResult) -> String {
    let mut lines = vec![
        String::new(),
        format!("=== ITERATION {} ===", result.iteration),
        format!("Timestamp: {}", result.timestamp),
        format!("Status: {}", result.status),
        format!("Duration: {:.2}s", result.duration),
        format!("Files Generated: {}", result.code_files_count),
        format!("Test Files: {}", result.test_files_count),
        format!("Validation Errors: {}", result.validation_errors),
        format!("Compilation Success: {}", result.compilation_success),
        format!("Test Success: {}", result.test_results.success),
    ];
    if !result.errors_fixed.is_empty() {
        lines.push("Errors Fixed:".to_string());
        lines.extend(result.errors_fixed.iter().map(|error| format!("  - {error}")));
    }
    if !result.improvements.is_empty() {
        lines.push("Improvements:".to_string());
        lines.extend(result.improvements.iter().map(|improvement| format!("  + {improvement}")));
    }
    if !result.test_results.is_empty() {
        lines.push("Test Results Summary:".to_string());
        lines.extend(result.test_results.suites.iter().map(|(kind, suite)| {
            let verdict = if suite.success { "PASS" } else { "FAIL" };
            format!("  {kind}: {verdict}")
        }));
    }
    lines.push("-".repeat(50));
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[derive(Serialize)]
struct ReadmeContext<'a> {
    project_id: &'a str,
    completed_at: &'a str,
    final_files: usize,
    final_status: &'a str,
    total_iterations: usize,
    quality_score: f64,
    recommendations: &'a [String],
}

fn render_readme(ctx: &ReadmeContext<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("readme", README_TEMPLATE)?;
    let template = env.get_template("readme")?;
    Ok(template.render(context! {
        project_id => ctx.project_id,
        completed_at => ctx.completed_at,
        final_files => ctx.final_files,
        final_status => ctx.final_status,
        total_iterations => ctx.total_iterations,
        quality_score => format!("{:.1}", ctx.quality_score),
        recommendations => ctx.recommendations,
    })?)
}
