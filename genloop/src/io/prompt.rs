//! Prompt rendering for code, test and improvement requests.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::Value;

use crate::core::requirements::ProjectProfile;
use crate::core::types::{FileMap, TestFailure};

const CODE_GENERATION_TEMPLATE: &str = include_str!("prompts/code_generation.md");
const BACKEND_TESTS_TEMPLATE: &str = include_str!("prompts/backend_tests.md");
const FRONTEND_TESTS_TEMPLATE: &str = include_str!("prompts/frontend_tests.md");
const IMPROVEMENTS_TEMPLATE: &str = include_str!("prompts/improvements.md");

pub const CODE_SYSTEM_PROMPT: &str =
    "You are a senior software engineer. Produce complete, runnable project files.";
pub const TEST_SYSTEM_PROMPT: &str =
    "You are a test engineer. Write focused, deterministic tests that run without network access.";
pub const IMPROVEMENT_SYSTEM_PROMPT: &str =
    "You review failing test runs and propose minimal code fixes. Reply with JSON only.";

/// Files sent as context in test and improvement prompts.
pub const MAX_EXCERPT_FILES: usize = 5;
/// Characters kept per excerpt.
pub const MAX_EXCERPT_CHARS: usize = 1000;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileExcerpt {
    pub path: String,
    pub content: String,
}

/// First [`MAX_EXCERPT_FILES`] matching files, each clipped to
/// [`MAX_EXCERPT_CHARS`] characters.
pub fn excerpts(files: &FileMap, keep: impl Fn(&str) -> bool) -> Vec<FileExcerpt> {
    files
        .iter()
        .filter(|(path, _)| keep(path))
        .take(MAX_EXCERPT_FILES)
        .map(|(path, content)| FileExcerpt {
            path: path.clone(),
            content: content.chars().take(MAX_EXCERPT_CHARS).collect(),
        })
        .collect()
}

pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("code_generation", CODE_GENERATION_TEMPLATE)?;
        env.add_template("backend_tests", BACKEND_TESTS_TEMPLATE)?;
        env.add_template("frontend_tests", FRONTEND_TESTS_TEMPLATE)?;
        env.add_template("improvements", IMPROVEMENTS_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn render_code_generation(
        &self,
        requirements: &Value,
        iteration: u32,
        current_files: &FileMap,
        feedback: Option<&str>,
    ) -> Result<String> {
        let current: Vec<FileExcerpt> = current_files
            .iter()
            .map(|(path, content)| FileExcerpt {
                path: path.clone(),
                content: content.clone(),
            })
            .collect();
        let template = self.env.get_template("code_generation")?;
        Ok(template.render(context! {
            iteration => iteration,
            requirements => serde_json::to_string_pretty(requirements)?,
            current_files => current,
            feedback => feedback.map(str::trim).filter(|s| !s.is_empty()),
        })?)
    }

    pub fn render_backend_tests(&self, profile: &ProjectProfile, files: &[FileExcerpt]) -> Result<String> {
        let template = self.env.get_template("backend_tests")?;
        Ok(template.render(context! {
            project_type => &profile.project_type,
            backend_tech => profile.backend_tech.as_deref().unwrap_or("Python/FastAPI"),
            database_tech => &profile.database_tech,
            files => files,
        })?)
    }

    pub fn render_frontend_tests(
        &self,
        profile: &ProjectProfile,
        files: &[FileExcerpt],
        react: bool,
    ) -> Result<String> {
        let template = self.env.get_template("frontend_tests")?;
        Ok(template.render(context! {
            project_type => &profile.project_type,
            frontend_tech => profile.frontend_tech.as_deref().unwrap_or("React"),
            files => files,
            react => react,
        })?)
    }

    pub fn render_improvements(
        &self,
        attempt: u32,
        failures: &[TestFailure],
        files: &[FileExcerpt],
    ) -> Result<String> {
        let template = self.env.get_template("improvements")?;
        Ok(template.render(context! {
            attempt => attempt,
            failures => failures,
            files => files,
        })?)
    }
}
