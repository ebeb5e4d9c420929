//! One-time migration from the numbered `iter-<n>` layout.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::classifier::is_test_file;
use crate::core::types::FileMap;
use crate::io::fs::{read_json, read_tree};
use crate::io::structure::{LEGACY_ITERATION_PREFIX, ProjectStructure, StructureManager};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub structure: ProjectStructure,
    /// Number of the iteration directory that was kept.
    pub migrated_iteration: Option<u32>,
    pub source_files: usize,
    pub test_files: usize,
    pub metadata_migrated: bool,
}

/// Move the latest `iter-<n>` directory of `old_project_path` into the
/// canonical layout for `project_id`, split into source and tests.
///
/// Legacy content is read before the canonical structure is created, since
/// creation removes leftover `iter-*` directories when both layouts share a
/// root.
#[instrument(skip(manager))]
pub fn migrate_from_old_structure(
    manager: &StructureManager,
    project_id: &str,
    project_name: &str,
    old_project_path: &Path,
) -> Result<MigrationReport> {
    let latest = latest_iteration_dir(old_project_path)?;
    let legacy_files = match &latest {
        Some((_, dir)) => read_tree(dir)?,
        None => {
            warn!(path = %old_project_path.display(), "no iteration directories found");
            FileMap::new()
        }
    };
    let legacy_metadata = load_legacy_metadata(old_project_path);

    let structure = manager.create_project_structure(project_id, project_name)?;
    let (tests, source): (FileMap, FileMap) = legacy_files
        .into_iter()
        .partition(|(path, _)| is_test_file(path));

    manager.save_source_code(&structure, &source, 1)?;
    manager.save_test_files(&structure, &tests)?;

    let metadata_migrated = match legacy_metadata {
        Some(metadata) => match manager.save_project_metadata(&structure, &metadata) {
            Ok(()) => true,
            Err(err) => {
                warn!(err = %err, "could not migrate project metadata");
                false
            }
        },
        None => false,
    };

    info!(
        source_files = source.len(),
        test_files = tests.len(),
        "migration completed"
    );
    Ok(MigrationReport {
        structure,
        migrated_iteration: latest.map(|(n, _)| n),
        source_files: source.len(),
        test_files: tests.len(),
        metadata_migrated,
    })
}

fn latest_iteration_dir(old_project_path: &Path) -> Result<Option<(u32, std::path::PathBuf)>> {
    if !old_project_path.is_dir() {
        return Ok(None);
    }
    let mut latest: Option<(u32, std::path::PathBuf)> = None;
    let entries = std::fs::read_dir(old_project_path)
        .with_context(|| format!("read dir {}", old_project_path.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(number) = name
            .strip_prefix(LEGACY_ITERATION_PREFIX)
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        if entry.path().is_dir() && latest.as_ref().is_none_or(|(best, _)| number > *best) {
            latest = Some((number, entry.path()));
        }
    }
    Ok(latest)
}

fn load_legacy_metadata(old_project_path: &Path) -> Option<Value> {
    let path = old_project_path.join("project.json");
    if !path.exists() {
        return None;
    }
    read_json(&path)
        .map_err(|err| warn!(path = %path.display(), err = %err, "unreadable legacy metadata"))
        .ok()
}
