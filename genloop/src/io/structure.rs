//! Canonical on-disk layout of a generated project.
//!
//! ```text
//! <output_root>/<project_id>/
//!   project-<name>/        current source tree
//!   .tests/{unit,integration,e2e}/
//!   .reports/iteration_<n>.json, final_report.json
//!   .metadata/project.json, requirements.yaml, generation_log.json
//!   .snapshots/before_iteration_<n>/
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::{self, TESTS_DIR, TestCategory};
use crate::core::sanitize::{clean_project_name, source_dir_name};
use crate::core::types::FileMap;
use crate::io::fs::{
    copy_dir, count_files, read_json, read_tree, remove_dir_if_exists, safe_join, tree_size,
    write_atomic, write_json,
};

pub const LEGACY_ITERATION_PREFIX: &str = "iter-";

/// Raised only at the structure-validation boundary.
#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    #[error("project base directory missing: {0}")]
    MissingBase(PathBuf),
}

/// Paths owned by one generation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectStructure {
    pub project_id: String,
    /// Sanitized project name.
    pub project_name: String,
    pub base_path: PathBuf,
    pub source_path: PathBuf,
    pub tests_path: PathBuf,
    pub reports_path: PathBuf,
    pub metadata_path: PathBuf,
    pub snapshots_path: PathBuf,
}

impl ProjectStructure {
    /// Pure path derivation; nothing is created.
    pub fn new(output_root: &Path, project_id: &str, project_name: &str) -> Self {
        let base_path = output_root.join(project_id);
        Self {
            project_id: project_id.to_string(),
            project_name: clean_project_name(project_name),
            source_path: base_path.join(source_dir_name(project_name)),
            tests_path: base_path.join(TESTS_DIR),
            reports_path: base_path.join(".reports"),
            metadata_path: base_path.join(".metadata"),
            snapshots_path: base_path.join(".snapshots"),
            base_path,
        }
    }

    pub fn source_dir_name(&self) -> String {
        source_dir_name(&self.project_name)
    }

    pub fn iteration_report_path(&self, iteration: u32) -> PathBuf {
        self.reports_path.join(format!("iteration_{iteration}.json"))
    }

    pub fn final_report_path(&self) -> PathBuf {
        self.reports_path.join("final_report.json")
    }

    pub fn snapshot_path(&self, iteration: u32) -> PathBuf {
        self.snapshots_path
            .join(format!("before_iteration_{iteration}"))
    }

    pub fn generation_log_path(&self) -> PathBuf {
        self.metadata_path.join("generation_log.json")
    }

    fn required_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![
            self.source_path.clone(),
            self.tests_path.clone(),
            self.reports_path.clone(),
            self.metadata_path.clone(),
            self.snapshots_path.clone(),
        ];
        dirs.extend(
            TestCategory::ALL
                .iter()
                .map(|c| self.tests_path.join(c.dir_name())),
        );
        dirs
    }
}

/// Counts from a source save. Existence is checked per file, not by content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSaveReport {
    pub files_created: usize,
    pub files_modified: usize,
    /// Paths refused because they would escape the tree.
    pub rejected: Vec<String>,
}

/// Counts from saving an organized file map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnifiedSaveReport {
    pub source: SourceSaveReport,
    pub test_files_saved: usize,
}

/// One entry of `.metadata/generation_log.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationLogEntry {
    pub iteration: u32,
    pub timestamp: String,
    pub files_created: usize,
    pub files_modified: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructureValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectStatistics {
    pub project_id: String,
    pub project_name: String,
    pub structure_valid: bool,
    pub source_files: usize,
    pub test_files: usize,
    pub reports: usize,
    pub size_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalReportStatistics {
    pub source_files: usize,
    pub test_files: usize,
    pub total_files: usize,
}

/// `.reports/final_report.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalReport {
    pub project_id: String,
    pub project_name: String,
    pub generation_completed_at: String,
    pub final_status: String,
    pub total_iterations: usize,
    pub statistics: FinalReportStatistics,
    pub structure: ProjectStructure,
    pub iteration_summary: Vec<Value>,
    pub final_data: Value,
}

/// Creates and maintains project layouts under one output root.
#[derive(Debug, Clone)]
pub struct StructureManager {
    output_root: PathBuf,
}

impl StructureManager {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Derive and create every canonical directory, removing legacy
    /// numbered iteration directories found at the same root.
    #[instrument(skip(self))]
    pub fn create_project_structure(
        &self,
        project_id: &str,
        project_name: &str,
    ) -> Result<ProjectStructure> {
        let structure = ProjectStructure::new(&self.output_root, project_id, project_name);
        for dir in structure.required_dirs() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("create directory {}", dir.display()))?;
        }
        for legacy in legacy_iteration_dirs(&structure.base_path)? {
            info!(path = %legacy.display(), "removing legacy iteration directory");
            remove_dir_if_exists(&legacy)?;
        }
        info!(base = %structure.base_path.display(), "project structure ready");
        Ok(structure)
    }

    /// Write non-test files into the source tree.
    ///
    /// From the second iteration on, the current tree is first copied to
    /// `.snapshots/before_iteration_<n>/`. Snapshot failures are logged and
    /// never abort the save.
    #[instrument(skip_all, fields(iteration = iteration, files = files.len()))]
    pub fn save_source_code(
        &self,
        structure: &ProjectStructure,
        files: &FileMap,
        iteration: u32,
    ) -> Result<SourceSaveReport> {
        if iteration > 1 {
            create_snapshot(structure, iteration);
        }

        let mut report = SourceSaveReport::default();
        for (rel, content) in files {
            if classifier::is_test_file(rel) {
                continue;
            }
            let path = match safe_join(&structure.source_path, rel) {
                Ok(path) => path,
                Err(err) => {
                    warn!(path = %rel, err = %err, "rejecting source path");
                    report.rejected.push(rel.clone());
                    continue;
                }
            };
            if path.exists() {
                report.files_modified += 1;
            } else {
                report.files_created += 1;
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create directory {}", parent.display()))?;
            }
            fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
        }
        info!(
            created = report.files_created,
            modified = report.files_modified,
            "source code saved"
        );
        Ok(report)
    }

    /// Write test files into their category subtree, dropping redundant
    /// leading test directories. Returns the number of files written.
    #[instrument(skip_all, fields(files = files.len()))]
    pub fn save_test_files(&self, structure: &ProjectStructure, files: &FileMap) -> Result<usize> {
        let mut saved = 0;
        for (rel, content) in files {
            let dest = classifier::test_destination(rel);
            let path = match safe_join(&structure.tests_path, &dest) {
                Ok(path) => path,
                Err(err) => {
                    warn!(path = %rel, err = %err, "rejecting test path");
                    continue;
                }
            };
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create directory {}", parent.display()))?;
            }
            fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
            saved += 1;
        }
        debug!(saved, "test files saved");
        Ok(saved)
    }

    /// Save the output of `organize_files`: source-prefixed paths go to the
    /// source tree, `.tests/` paths into the test tree as already placed.
    #[instrument(skip_all, fields(iteration = iteration))]
    pub fn save_to_unified_structure(
        &self,
        structure: &ProjectStructure,
        organized: &FileMap,
        iteration: u32,
    ) -> Result<UnifiedSaveReport> {
        let source_prefix = format!("{}/", structure.source_dir_name());
        let tests_prefix = format!("{TESTS_DIR}/");

        let mut source = FileMap::new();
        let mut raw_tests = FileMap::new();
        let mut placed_tests = FileMap::new();
        for (path, content) in organized {
            if let Some(rel) = path.strip_prefix(&tests_prefix) {
                placed_tests.insert(rel.to_string(), content.clone());
                continue;
            }
            let rel = path.strip_prefix(&source_prefix).unwrap_or(path);
            if classifier::is_test_file(rel) {
                raw_tests.insert(rel.to_string(), content.clone());
            } else {
                source.insert(rel.to_string(), content.clone());
            }
        }

        let source_report = self.save_source_code(structure, &source, iteration)?;
        let mut test_files_saved = self.save_test_files(structure, &raw_tests)?;
        for (rel, content) in &placed_tests {
            match safe_join(&structure.tests_path, rel) {
                Ok(path) => {
                    write_atomic(&path, content)?;
                    test_files_saved += 1;
                }
                Err(err) => warn!(path = %rel, err = %err, "rejecting test path"),
            }
        }

        self.append_generation_log(
            structure,
            GenerationLogEntry {
                iteration,
                timestamp: Utc::now().to_rfc3339(),
                files_created: source_report.files_created,
                files_modified: source_report.files_modified,
            },
        );

        Ok(UnifiedSaveReport {
            source: source_report,
            test_files_saved,
        })
    }

    /// Read the whole current source tree.
    pub fn get_current_source_files(&self, structure: &ProjectStructure) -> Result<FileMap> {
        let files = read_tree(&structure.source_path)?;
        debug!(files = files.len(), "loaded current source files");
        Ok(files)
    }

    /// Read the whole test tree, keyed relative to `.tests/`.
    pub fn get_test_files(&self, structure: &ProjectStructure) -> Result<FileMap> {
        read_tree(&structure.tests_path)
    }

    pub fn save_iteration_report<T: Serialize>(
        &self,
        structure: &ProjectStructure,
        iteration: u32,
        report: &T,
    ) -> Result<PathBuf> {
        let path = structure.iteration_report_path(iteration);
        write_json(&path, report)?;
        info!(path = %path.display(), "saved iteration report");
        Ok(path)
    }

    /// Write `.metadata/project.json`, plus `requirements.yaml` when the
    /// metadata carries a `requirements` entry. The YAML copy is best-effort.
    pub fn save_project_metadata(&self, structure: &ProjectStructure, metadata: &Value) -> Result<()> {
        write_json(&structure.metadata_path.join("project.json"), metadata)?;
        if let Some(requirements) = metadata.get("requirements") {
            let path = structure.metadata_path.join("requirements.yaml");
            let written = serde_yaml::to_string(requirements)
                .context("serialize requirements yaml")
                .and_then(|yaml| write_atomic(&path, &yaml));
            if let Err(err) = written {
                warn!(path = %path.display(), err = %err, "could not save requirements.yaml");
            }
        }
        Ok(())
    }

    /// Aggregate every iteration report into `.reports/final_report.json`.
    #[instrument(skip_all)]
    pub fn create_final_report(
        &self,
        structure: &ProjectStructure,
        final_data: &Value,
    ) -> Result<FinalReport> {
        let iteration_summary = load_iteration_reports(&structure.reports_path)?;
        let source_files = count_files(&structure.source_path);
        let test_files = count_files(&structure.tests_path);
        let report = FinalReport {
            project_id: structure.project_id.clone(),
            project_name: structure.project_name.clone(),
            generation_completed_at: Utc::now().to_rfc3339(),
            final_status: final_data
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            total_iterations: iteration_summary.len(),
            statistics: FinalReportStatistics {
                source_files,
                test_files,
                total_files: source_files + test_files,
            },
            structure: structure.clone(),
            iteration_summary,
            final_data: final_data.clone(),
        };
        write_json(&structure.final_report_path(), &report)?;
        info!(path = %structure.final_report_path().display(), "final report saved");
        Ok(report)
    }

    pub fn cleanup_project(
        &self,
        structure: &ProjectStructure,
        keep_snapshots: bool,
        keep_reports: bool,
    ) -> Result<()> {
        if !keep_snapshots {
            remove_dir_if_exists(&structure.snapshots_path)?;
        }
        if !keep_reports {
            remove_dir_if_exists(&structure.reports_path)?;
        }
        info!(keep_snapshots, keep_reports, "project cleanup completed");
        Ok(())
    }

    pub fn project_statistics(&self, structure: &ProjectStructure) -> ProjectStatistics {
        let reports = fs::read_dir(&structure.reports_path)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .count()
            })
            .unwrap_or(0);
        let total_size: u64 = [
            &structure.source_path,
            &structure.tests_path,
            &structure.reports_path,
            &structure.metadata_path,
        ]
        .iter()
        .filter(|p| p.exists())
        .map(|p| tree_size(p))
        .sum();
        ProjectStatistics {
            project_id: structure.project_id.clone(),
            project_name: structure.project_name.clone(),
            structure_valid: structure.source_path.exists(),
            source_files: count_files(&structure.source_path),
            test_files: count_files(&structure.tests_path),
            reports,
            size_mb: (total_size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        }
    }

    /// Check the layout. A missing base directory is the one hard error;
    /// missing subdirectories and legacy leftovers are warnings.
    pub fn validate_structure(&self, structure: &ProjectStructure) -> Result<StructureValidation> {
        if !structure.base_path.is_dir() {
            return Err(StructureError::MissingBase(structure.base_path.clone()).into());
        }
        let mut validation = StructureValidation {
            valid: true,
            ..StructureValidation::default()
        };
        for dir in structure.required_dirs() {
            if !dir.is_dir() {
                validation
                    .warnings
                    .push(format!("missing directory {}", dir.display()));
            }
        }
        for legacy in legacy_iteration_dirs(&structure.base_path)? {
            validation
                .warnings
                .push(format!("legacy iteration directory {}", legacy.display()));
        }
        if !structure.source_path.is_dir() {
            validation.valid = false;
            validation.errors.push(format!(
                "source directory missing {}",
                structure.source_path.display()
            ));
        }
        Ok(validation)
    }

    fn append_generation_log(&self, structure: &ProjectStructure, entry: GenerationLogEntry) {
        let path = structure.generation_log_path();
        let mut entries: Vec<GenerationLogEntry> = if path.exists() {
            read_json(&path).unwrap_or_else(|err| {
                warn!(path = %path.display(), err = %err, "resetting unreadable generation log");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        entries.push(entry);
        if let Err(err) = write_json(&path, &entries) {
            warn!(path = %path.display(), err = %err, "could not write generation log");
        }
    }
}

/// Legacy `iter-<n>` directories directly under `base`.
pub fn legacy_iteration_dirs(base: &Path) -> Result<Vec<PathBuf>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(base).with_context(|| format!("read dir {}", base.display()))? {
        let entry = entry.with_context(|| format!("read dir entry {}", base.display()))?;
        let is_legacy = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(LEGACY_ITERATION_PREFIX));
        if is_legacy && entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn create_snapshot(structure: &ProjectStructure, iteration: u32) {
    let has_content = fs::read_dir(&structure.source_path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);
    if !has_content {
        return;
    }
    let snapshot = structure.snapshot_path(iteration);
    match copy_dir(&structure.source_path, &snapshot) {
        Ok(()) => debug!(path = %snapshot.display(), "snapshot created"),
        Err(err) => warn!(path = %snapshot.display(), err = %err, "could not create snapshot"),
    }
}

fn load_iteration_reports(reports_path: &Path) -> Result<Vec<Value>> {
    if !reports_path.is_dir() {
        return Ok(Vec::new());
    }
    let mut numbered = Vec::new();
    for entry in
        fs::read_dir(reports_path).with_context(|| format!("read dir {}", reports_path.display()))?
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(number) = name
            .strip_prefix("iteration_")
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        match read_json::<Value>(&entry.path()) {
            Ok(value) => numbered.push((number, value)),
            Err(err) => warn!(path = %entry.path().display(), err = %err, "skipping unreadable report"),
        }
    }
    numbered.sort_by_key(|(n, _)| *n);
    Ok(numbered.into_iter().map(|(_, v)| v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn files(entries: &[(&str, &str)]) -> FileMap {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn creates_layout_and_removes_legacy_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let legacy = temp.path().join("p1").join("iter-2");
        fs::create_dir_all(&legacy).expect("legacy");
        let manager = StructureManager::new(temp.path());
        let structure = manager
            .create_project_structure("p1", "Todo App!")
            .expect("create");
        assert_eq!(structure.project_name, "todoapp");
        assert!(structure.source_path.ends_with("project-todoapp"));
        assert!(structure.tests_path.join("e2e").is_dir());
        assert!(!legacy.exists());

        // Idempotent.
        manager
            .create_project_structure("p1", "Todo App!")
            .expect("create again");
        let validation = manager.validate_structure(&structure).expect("validate");
        assert!(validation.valid);
        assert!(validation.warnings.is_empty());
    }

    #[test]
    fn save_counts_created_and_modified_and_skips_tests() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = StructureManager::new(temp.path());
        let structure = manager.create_project_structure("p", "demo").expect("create");

        let first = files(&[("main.py", "v1"), ("test_main.py", "t")]);
        let report = manager
            .save_source_code(&structure, &first, 1)
            .expect("save");
        assert_eq!(report.files_created, 1);
        assert_eq!(report.files_modified, 0);
        assert!(!structure.snapshot_path(1).exists());

        let second = files(&[("main.py", "v2"), ("util.py", "u"), ("../escape.py", "x")]);
        let report = manager
            .save_source_code(&structure, &second, 2)
            .expect("save");
        assert_eq!(report.files_created, 1);
        assert_eq!(report.files_modified, 1);
        assert_eq!(report.rejected, vec!["../escape.py".to_string()]);

        let snapshot = read_tree(&structure.snapshot_path(2)).expect("snapshot");
        assert_eq!(snapshot, files(&[("main.py", "v1")]));
        let current = manager.get_current_source_files(&structure).expect("read");
        assert_eq!(current, files(&[("main.py", "v2"), ("util.py", "u")]));
    }

    #[test]
    fn tests_are_partitioned_without_double_nesting() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = StructureManager::new(temp.path());
        let structure = manager.create_project_structure("p", "demo").expect("create");
        let saved = manager
            .save_test_files(
                &structure,
                &files(&[
                    ("tests/test_api.py", "a"),
                    ("__tests__/integration.test.js", "b"),
                    ("cypress/home.cy.js", "c"),
                ]),
            )
            .expect("save");
        assert_eq!(saved, 3);
        let tree = manager.get_test_files(&structure).expect("read");
        let paths: Vec<&str> = tree.keys().map(String::as_str).collect();
        assert_eq!(
            paths,
            vec![
                "e2e/cypress/home.cy.js",
                "integration/integration.test.js",
                "unit/test_api.py",
            ]
        );
    }

    #[test]
    fn unified_save_splits_organized_files_and_logs_generation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = StructureManager::new(temp.path());
        let structure = manager.create_project_structure("p", "demo").expect("create");
        let organized = files(&[
            ("project-demo/backend/main.py", "m"),
            ("project-demo/backend/test_extra.py", "t"),
            (".tests/unit/test_main.py", "u"),
        ]);
        let report = manager
            .save_to_unified_structure(&structure, &organized, 1)
            .expect("save");
        assert_eq!(report.source.files_created, 1);
        assert_eq!(report.test_files_saved, 2);
        assert!(structure.tests_path.join("unit/test_main.py").is_file());
        assert!(structure.tests_path.join("unit/backend/test_extra.py").is_file());

        let log: Vec<GenerationLogEntry> =
            read_json(&structure.generation_log_path()).expect("log");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].files_created, 1);
    }

    #[test]
    fn final_report_orders_iterations() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = StructureManager::new(temp.path());
        let structure = manager.create_project_structure("p", "demo").expect("create");
        for i in [10u32, 2, 1] {
            manager
                .save_iteration_report(&structure, i, &json!({"iteration": i}))
                .expect("report");
        }
        manager
            .save_source_code(&structure, &files(&[("a.py", "1")]), 1)
            .expect("save");
        let report = manager
            .create_final_report(&structure, &json!({"status": "success"}))
            .expect("final");
        let order: Vec<u64> = report
            .iteration_summary
            .iter()
            .filter_map(|v| v["iteration"].as_u64())
            .collect();
        assert_eq!(order, vec![1, 2, 10]);
        assert_eq!(report.final_status, "success");
        assert_eq!(report.statistics.source_files, 1);
        let stored: FinalReport = read_json(&structure.final_report_path()).expect("stored report");
        assert_eq!(stored, report);

        let stats = manager.project_statistics(&structure);
        assert_eq!(stats.reports, 4);
        assert!(stats.structure_valid);
    }

    #[test]
    fn metadata_writes_requirements_yaml() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = StructureManager::new(temp.path());
        let structure = manager.create_project_structure("p", "demo").expect("create");
        manager
            .save_project_metadata(
                &structure,
                &json!({"project_id": "p", "requirements": {"project": {"type": "backend"}}}),
            )
            .expect("metadata");
        let yaml = fs::read_to_string(structure.metadata_path.join("requirements.yaml"))
            .expect("yaml");
        assert!(yaml.contains("type: backend"));
    }

    #[test]
    fn validation_fails_hard_only_for_missing_base() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = StructureManager::new(temp.path());
        let structure = ProjectStructure::new(temp.path(), "ghost", "x");
        let err = manager.validate_structure(&structure).expect_err("missing");
        assert!(err.downcast_ref::<StructureError>().is_some());

        fs::create_dir_all(&structure.base_path).expect("base");
        let validation = manager.validate_structure(&structure).expect("validate");
        assert!(!validation.valid);
        assert!(!validation.warnings.is_empty());
    }

    #[test]
    fn cleanup_respects_flags() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = StructureManager::new(temp.path());
        let structure = manager.create_project_structure("p", "demo").expect("create");
        manager.cleanup_project(&structure, false, true).expect("cleanup");
        assert!(!structure.snapshots_path.exists());
        assert!(structure.reports_path.exists());
    }
}
