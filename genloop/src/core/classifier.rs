//! Path-based classification of generated files.
//!
//! Classification is a pure function of the path string and the project
//! profile. Rules are evaluated in a fixed order: test detection first, then
//! backend, frontend, configuration, and finally the project root.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::requirements::ProjectProfile;
use crate::core::sanitize::source_dir_name;
use crate::core::types::FileMap;

/// Root of the partitioned test tree inside a project.
pub const TESTS_DIR: &str = ".tests";

const TEST_INDICATORS: &[&str] = &[
    ".test.", "_test.", "test_", "/tests/", "/test/", ".spec.", "_spec.", "spec_", "/specs/",
    "/spec/", "cypress", "e2e", "playwright",
];

const E2E_INDICATORS: &[&str] = &["e2e", "cypress", "playwright"];

const TEST_PREFIXES: &[&str] = &["tests/", "test/", "__tests__/", "specs/", "spec/"];

const BACKEND_INDICATORS: &[&str] = &[
    ".py", "requirements.txt", "app/", "api/", "models/", "schemas/", "database/", "db/",
    "migrations/", "alembic/", "fastapi", "django", "flask", "main.py", "wsgi.py", "asgi.py",
    "manage.py", "celery", "__pycache__/", ".pyc", "pytest", "test_", "_test.py", "poetry.lock",
    "pyproject.toml", "setup.py", "pipfile",
];

const FRONTEND_INDICATORS: &[&str] = &[
    ".tsx", ".jsx", ".ts", ".js", ".css", ".scss", ".html", ".vue", "src/", "public/",
    "components/", "pages/", "styles/", "assets/", "package.json", "package-lock.json",
    "yarn.lock", "node_modules/", "build/", "dist/", "webpack", "react", "vue", "angular", "next",
    "vite", "tailwind", ".babelrc", "tsconfig.json",
];

const CONFIG_INDICATORS: &[&str] = &[
    "dockerfile", "docker-compose", ".env", ".gitignore", "readme.md", "license", "makefile",
    ".editorconfig", ".prettierrc", "eslint",
];

/// Partition of the test tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    Unit,
    Integration,
    E2e,
}

impl TestCategory {
    pub const ALL: [TestCategory; 3] = [TestCategory::Unit, TestCategory::Integration, TestCategory::E2e];

    pub fn dir_name(self) -> &'static str {
        match self {
            TestCategory::Unit => "unit",
            TestCategory::Integration => "integration",
            TestCategory::E2e => "e2e",
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Where a raw generated file belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Already inside the canonical namespace; kept verbatim.
    Source,
    Backend,
    Frontend,
    Config,
    Test(TestCategory),
    Root,
}

pub fn is_test_file(path: &str) -> bool {
    let lower = normalized(path);
    TEST_INDICATORS.iter().any(|i| lower.contains(i))
}

pub fn test_category(path: &str) -> TestCategory {
    let lower = normalized(path);
    if E2E_INDICATORS.iter().any(|i| lower.contains(i)) {
        TestCategory::E2e
    } else if lower.contains("integration") {
        TestCategory::Integration
    } else {
        TestCategory::Unit
    }
}

pub fn is_backend_file(path: &str) -> bool {
    let lower = normalized(path);
    BACKEND_INDICATORS.iter().any(|i| lower.contains(i))
}

pub fn is_frontend_file(path: &str) -> bool {
    let lower = normalized(path);
    FRONTEND_INDICATORS.iter().any(|i| lower.contains(i))
}

pub fn is_config_file(path: &str) -> bool {
    let lower = normalized(path);
    CONFIG_INDICATORS.iter().any(|i| lower.contains(i))
}

/// Drop the first redundant leading test directory (`tests/`, `__tests__/`, ...).
pub fn strip_test_prefix(path: &str) -> &str {
    let path = path.trim_start_matches('/');
    TEST_PREFIXES
        .iter()
        .find_map(|prefix| path.strip_prefix(prefix))
        .unwrap_or(path)
}

/// Path of a test file inside the partitioned test tree, relative to it.
pub fn test_destination(path: &str) -> String {
    format!("{}/{}", test_category(path).dir_name(), strip_test_prefix(path))
}

/// Classify one raw path.
pub fn classify(path: &str, source_dir: &str) -> Destination {
    if is_canonical(path, source_dir) {
        return Destination::Source;
    }
    if is_test_file(path) {
        return Destination::Test(test_category(path));
    }
    if is_backend_file(path) {
        Destination::Backend
    } else if is_frontend_file(path) {
        Destination::Frontend
    } else if is_config_file(path) {
        Destination::Config
    } else {
        Destination::Root
    }
}

/// Map raw generated paths to their place under the project base directory.
///
/// Source files land under `project-<name>/`, test files under
/// `.tests/<category>/`. Paths already inside either namespace pass through.
pub fn organize_files(raw_files: &FileMap, profile: &ProjectProfile, project_name: &str) -> FileMap {
    let source_dir = source_dir_name(project_name);
    raw_files
        .iter()
        .map(|(path, content)| {
            (
                destination_path(path, &source_dir, profile),
                content.clone(),
            )
        })
        .collect()
}

/// Destination of a single path; see [`organize_files`].
pub fn destination_path(path: &str, source_dir: &str, profile: &ProjectProfile) -> String {
    let rel = path.trim_start_matches("./").trim_start_matches('/');
    match classify(rel, source_dir) {
        Destination::Source => rel.to_string(),
        Destination::Test(_) => format!("{TESTS_DIR}/{}", test_destination(rel)),
        Destination::Backend if profile.has_backend => {
            format!("{source_dir}/backend/{}", rel.strip_prefix("backend/").unwrap_or(rel))
        }
        Destination::Frontend if profile.has_frontend => {
            format!("{source_dir}/frontend/{}", rel.strip_prefix("frontend/").unwrap_or(rel))
        }
        Destination::Backend | Destination::Frontend | Destination::Config | Destination::Root => {
            format!("{source_dir}/{rel}")
        }
    }
}

fn is_canonical(path: &str, source_dir: &str) -> bool {
    [source_dir, TESTS_DIR]
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
}

fn normalized(path: &str) -> String {
    // Leading slash lets directory indicators match a top-level directory.
    format!("/{}", path.replace('\\', "/").to_lowercase())
}
