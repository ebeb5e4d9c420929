//! Heuristic quality score used as the final-tree acceptance gate.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::core::types::FileMap;

/// Config names that earn a bonus in the score.
const SCORED_CONFIG_FILES: &[&str] = &["package.json", "requirements.txt", "tsconfig.json"];

/// Config names that count as "has configuration" in reports.
pub const RECOGNIZED_CONFIG_FILES: &[&str] = &[
    "package.json",
    "requirements.txt",
    "tsconfig.json",
    ".env",
    "Dockerfile",
];

pub const MAX_SCORE: f64 = 100.0;

const SOURCE_DIR_PREFIX: &str = "project-";

/// Score a file set on a 0-100 scale.
///
/// Rewards extension diversity, spread over more than two directories, the
/// presence of test files, known dependency manifests and substantive
/// average content length. An empty set scores 0.
pub fn quality_score(files: &FileMap) -> f64 {
    if files.is_empty() {
        return 0.0;
    }

    let mut score = 50.0;
    score += 5.0 * extensions(files).len() as f64;
    if directories(files).len() > 2 {
        score += 10.0;
    }
    if files.keys().any(|p| p.to_lowercase().contains("test")) {
        score += 20.0;
    }
    let manifests = files
        .keys()
        .filter(|p| SCORED_CONFIG_FILES.contains(&file_name(p)))
        .count();
    score += 5.0 * manifests as f64;

    let total_len: usize = files.values().map(String::len).sum();
    if total_len as f64 / files.len() as f64 > 500.0 {
        score += 10.0;
    }

    score.min(MAX_SCORE)
}

/// More than two distinct parent directories.
pub fn has_organized_structure(files: &FileMap) -> bool {
    directories(files).len() > 2
}

/// Any file whose name mentions "test".
pub fn has_test_files(files: &FileMap) -> bool {
    files
        .keys()
        .any(|p| file_name(p).to_lowercase().contains("test"))
}

/// A recognized config file at the root of the project, of its source
/// tree (`project-<name>/`) or of the source tree's backend or frontend.
pub fn has_config_files(files: &FileMap) -> bool {
    files
        .keys()
        .any(|p| RECOGNIZED_CONFIG_FILES.contains(&project_relative(p)))
}

fn project_relative(path: &str) -> &str {
    let path = match path.split_once('/') {
        Some((first, rest)) if first.starts_with(SOURCE_DIR_PREFIX) => rest,
        _ => path,
    };
    ["backend/", "frontend/"]
        .iter()
        .find_map(|part| path.strip_prefix(part))
        .unwrap_or(path)
}

/// File count per lowercase extension (with leading dot, empty for none).
pub fn file_diversity(files: &FileMap) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for path in files.keys() {
        *counts.entry(extension(path).to_lowercase()).or_insert(0) += 1;
    }
    counts
}

fn extensions(files: &FileMap) -> BTreeSet<String> {
    files.keys().map(|p| extension(p)).collect()
}

fn directories(files: &FileMap) -> BTreeSet<String> {
    files
        .keys()
        .map(|p| {
            Path::new(p)
                .parent()
                .map(|d| d.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect()
}

fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
