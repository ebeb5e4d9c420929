//! Scripted collaborators and builders for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::agents::generator::{CodeSource, GenerationRequest};
use crate::core::types::FileMap;
use crate::io::llm::LlmClient;
use crate::io::process::{CommandOutput, CommandRunner, CommandSpec};

/// Build a file map from `(path, content)` pairs.
pub fn file_map(entries: &[(&str, &str)]) -> FileMap {
    entries
        .iter()
        .map(|(path, content)| (path.to_string(), content.to_string()))
        .collect()
}

/// Successful output with the given stdout.
pub fn ok_output(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        stdout: stdout.as_bytes().to_vec(),
        ..CommandOutput::default()
    }
}

/// Nonzero exit with the given stderr.
pub fn exit_output(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(code),
        stderr: stderr.as_bytes().to_vec(),
        ..CommandOutput::default()
    }
}

/// A process killed at its timeout.
pub fn timed_out_output() -> CommandOutput {
    CommandOutput {
        exit_code: None,
        timed_out: true,
        ..CommandOutput::default()
    }
}

enum Scripted {
    Output(CommandOutput),
    SpawnError(String),
}

/// Command runner answering by substring match on the rendered command
/// line. The first matching rule wins; unmatched commands succeed with
/// empty output.
#[derive(Default)]
pub struct ScriptedCommandRunner {
    rules: Vec<(String, Scripted)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, pattern: &str, output: CommandOutput) -> Self {
        self.rules.push((pattern.to_string(), Scripted::Output(output)));
        self
    }

    pub fn fail_spawn(mut self, pattern: &str, message: &str) -> Self {
        self.rules
            .push((pattern.to_string(), Scripted::SpawnError(message.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Rendered command lines in call order.
    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().expect("calls lock").push(spec.clone());
        let line = spec.to_string();
        match self.rules.iter().find(|(pattern, _)| line.contains(pattern.as_str())) {
            Some((_, Scripted::Output(output))) => Ok(output.clone()),
            Some((_, Scripted::SpawnError(message))) => Err(anyhow!("{message}")),
            None => Ok(ok_output("")),
        }
    }
}

/// Recorded LLM request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmCall {
    pub provider: String,
    pub prompt: String,
    pub system_prompt: String,
}

/// LLM answering by substring match on the prompt. Rules are checked in
/// order; unmatched prompts fail like a transport error.
#[derive(Default)]
pub struct ScriptedLlm {
    rules: Vec<(String, Result<String, String>)>,
    calls: Mutex<Vec<LlmCall>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, pattern: &str, text: &str) -> Self {
        self.rules.push((pattern.to_string(), Ok(text.to_string())));
        self
    }

    pub fn fail(mut self, pattern: &str, message: &str) -> Self {
        self.rules.push((pattern.to_string(), Err(message.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<LlmCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, provider: &str, prompt: &str, system_prompt: &str) -> Result<String> {
        self.calls.lock().expect("calls lock").push(LlmCall {
            provider: provider.to_string(),
            prompt: prompt.to_string(),
            system_prompt: system_prompt.to_string(),
        });
        match self.rules.iter().find(|(pattern, _)| prompt.contains(pattern.as_str())) {
            Some((_, Ok(text))) => Ok(text.clone()),
            Some((_, Err(message))) => Err(anyhow!("{message}")),
            None => Err(anyhow!("no scripted response for prompt")),
        }
    }
}

/// Code source replaying one scripted result per iteration. Once the
/// script is exhausted the last successful file set is repeated.
#[derive(Default)]
pub struct ScriptedCodeSource {
    script: Mutex<VecDeque<Result<FileMap, String>>>,
    last: Mutex<Option<FileMap>>,
    requests: Mutex<Vec<(u32, usize, Option<String>)>>,
}

impl ScriptedCodeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_files(self, files: FileMap) -> Self {
        self.script.lock().expect("script lock").push_back(Ok(files));
        self
    }

    pub fn then_error(self, message: &str) -> Self {
        self.script
            .lock()
            .expect("script lock")
            .push_back(Err(message.to_string()));
        self
    }

    /// `(iteration, current file count, feedback)` per request.
    pub fn requests(&self) -> Vec<(u32, usize, Option<String>)> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl CodeSource for ScriptedCodeSource {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<FileMap> {
        self.requests.lock().expect("requests lock").push((
            request.iteration,
            request.current_files.len(),
            request.feedback.map(str::to_string),
        ));
        let next = self.script.lock().expect("script lock").pop_front();
        match next {
            Some(Ok(files)) => {
                *self.last.lock().expect("last lock") = Some(files.clone());
                Ok(files)
            }
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => self
                .last
                .lock()
                .expect("last lock")
                .clone()
                .ok_or_else(|| anyhow!("code source script exhausted")),
        }
    }
}
