//! Source of generated project files for each iteration.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument};

use crate::core::types::FileMap;
use crate::io::llm::{LlmClient, parse_file_blocks};
use crate::io::prompt::{CODE_SYSTEM_PROMPT, PromptEngine};

/// Inputs for one generation pass.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub requirements: &'a Value,
    pub iteration: u32,
    pub provider: &'a str,
    /// Accepted source tree so far; empty on the first iteration.
    pub current_files: &'a FileMap,
    /// Failure summary from the previous iteration, if any.
    pub feedback: Option<&'a str>,
}

#[async_trait]
pub trait CodeSource: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<FileMap>;
}

/// Prompts the LLM with requirements and current files and parses the
/// `<file>` blocks of the reply.
pub struct LlmCodeSource {
    llm: Arc<dyn LlmClient>,
    prompts: PromptEngine,
}

impl LlmCodeSource {
    pub fn new(llm: Arc<dyn LlmClient>) -> Result<Self> {
        Ok(Self {
            llm,
            prompts: PromptEngine::new()?,
        })
    }
}

#[async_trait]
impl CodeSource for LlmCodeSource {
    #[instrument(skip_all, fields(iteration = request.iteration, provider = request.provider))]
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<FileMap> {
        let prompt = self.prompts.render_code_generation(
            request.requirements,
            request.iteration,
            request.current_files,
            request.feedback,
        )?;
        let reply = self
            .llm
            .generate(request.provider, &prompt, CODE_SYSTEM_PROMPT)
            .await?;
        let files = parse_file_blocks(&reply)?;
        if files.is_empty() {
            bail!("model reply contained no <file> blocks");
        }
        info!(files = files.len(), "generated files");
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;

    #[tokio::test]
    async fn parses_generated_files() {
        let llm = Arc::new(ScriptedLlm::new().respond(
            "iteration 1",
            "<file path=\"main.py\">print('hi')</file>\n<file path=\"requirements.txt\">fastapi</file>",
        ));
        let source = LlmCodeSource::new(llm.clone()).expect("source");
        let requirements = serde_json::json!({"project": {"type": "backend"}});
        let files = source
            .generate(&GenerationRequest {
                requirements: &requirements,
                iteration: 1,
                provider: "local",
                current_files: &FileMap::new(),
                feedback: None,
            })
            .await
            .expect("generate");
        assert_eq!(files.len(), 2);
        assert_eq!(llm.calls()[0].system_prompt, CODE_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn empty_reply_is_an_error() {
        let llm = Arc::new(ScriptedLlm::new().respond("iteration", "Sorry, I cannot help."));
        let source = LlmCodeSource::new(llm).expect("source");
        let requirements = serde_json::json!({});
        let err = source
            .generate(&GenerationRequest {
                requirements: &requirements,
                iteration: 2,
                provider: "local",
                current_files: &FileMap::new(),
                feedback: Some("frontend failed"),
            })
            .await
            .expect_err("no files");
        assert!(err.to_string().contains("no <file> blocks"));
    }
}
