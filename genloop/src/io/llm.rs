//! Text-generation collaborator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, instrument};

use crate::core::types::FileMap;
use crate::io::config::LlmConfig;
use crate::io::process::{CommandRunner, CommandSpec, tail_chars};

const FILE_BLOCK_PATTERN: &str = r#"(?s)<file path=['"]([^'"]+)['"]>(.*?)</file>"#;

/// Characters of stderr kept when the generation command fails.
const ERROR_TAIL_CHARS: usize = 800;

/// Any raised error means the sub-step produced nothing usable.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, provider: &str, prompt: &str, system_prompt: &str) -> Result<String>;
}

/// Runs the configured external command with the conversation on stdin.
///
/// The provider name is exported as `GENLOOP_PROVIDER` so one wrapper
/// script can route between backends.
pub struct CommandLlm {
    config: LlmConfig,
    output_limit_bytes: usize,
    runner: Arc<dyn CommandRunner>,
}

impl CommandLlm {
    pub fn new(config: LlmConfig, output_limit_bytes: usize, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            output_limit_bytes,
            runner,
        }
    }

    fn stdin(prompt: &str, system_prompt: &str) -> String {
        let mut input = String::new();
        if !system_prompt.trim().is_empty() {
            input.push_str("System: ");
            input.push_str(system_prompt.trim());
            input.push_str("\n\n");
        }
        input.push_str("User: ");
        input.push_str(prompt.trim());
        input.push('\n');
        input
    }
}

#[async_trait]
impl LlmClient for CommandLlm {
    #[instrument(skip_all, fields(provider = provider, prompt_len = prompt.len()))]
    async fn generate(&self, provider: &str, prompt: &str, system_prompt: &str) -> Result<String> {
        let Some((program, args)) = self.config.command.split_first() else {
            bail!("llm.command is empty");
        };
        let spec = CommandSpec::new(
            program,
            Duration::from_secs(self.config.timeout_secs),
            self.output_limit_bytes,
        )
        .args(args.iter().cloned())
        .env("GENLOOP_PROVIDER", provider)
        .stdin(Self::stdin(prompt, system_prompt));

        let output = self.runner.run(&spec).await?;
        if output.timed_out {
            bail!("`{spec}` timed out after {}s", self.config.timeout_secs);
        }
        if !output.success() {
            bail!(
                "`{spec}` exited with {:?}: {}",
                output.exit_code,
                tail_chars(output.stderr_text().trim(), ERROR_TAIL_CHARS)
            );
        }
        let text = output.stdout_text();
        debug!(response_len = text.len(), "llm response received");
        Ok(text)
    }
}

/// Extract `<file path="...">...</file>` blocks. Later duplicates win.
pub fn parse_file_blocks(text: &str) -> Result<FileMap> {
    let re = Regex::new(FILE_BLOCK_PATTERN)?;
    Ok(re
        .captures_iter(text)
        .map(|caps| (caps[1].trim().to_string(), caps[2].trim().to_string()))
        .filter(|(path, _)| !path.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedCommandRunner, exit_output, ok_output};

    #[test]
    fn parses_file_blocks_with_either_quote() {
        let text = r#"Here you go:
<file path="app/main.py">
print("hi")
</file>
<file path='web/index.js'>console.log(1)</file>
<file path="">ignored</file>"#;
        let files = parse_file_blocks(text).expect("parse");
        assert_eq!(files.len(), 2);
        assert_eq!(files["app/main.py"], "print(\"hi\")");
        assert_eq!(files["web/index.js"], "console.log(1)");
    }

    #[test]
    fn no_blocks_yields_empty_map() {
        assert!(parse_file_blocks("nothing here").expect("parse").is_empty());
    }

    #[tokio::test]
    async fn command_llm_feeds_prompt_on_stdin() {
        let runner = Arc::new(ScriptedCommandRunner::new().respond("llm", ok_output("generated")));
        let llm = CommandLlm::new(LlmConfig::default(), 10_000, runner.clone());
        let text = llm.generate("local", "build it", "be terse").await.expect("generate");
        assert_eq!(text, "generated");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].stdin.as_deref(), Some("System: be terse\n\nUser: build it\n"));
        assert!(calls[0].env.contains(&("GENLOOP_PROVIDER".to_string(), "local".to_string())));
    }

    #[tokio::test]
    async fn command_llm_reports_nonzero_exit() {
        let runner = Arc::new(ScriptedCommandRunner::new().respond("llm", exit_output(2, "quota exceeded")));
        let llm = CommandLlm::new(LlmConfig::default(), 10_000, runner);
        let err = llm.generate("local", "p", "").await.expect_err("failure");
        assert!(format!("{err:#}").contains("quota exceeded"));
    }
}
