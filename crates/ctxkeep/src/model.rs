//! Model-calling capability consumed by the summarizing strategy.
//!
//! The engine never talks to a provider directly. It hands a
//! [`GenerateRequest`] to a [`ModelCaller`] and reads the text blocks of
//! whatever comes back. Provider clients, retries, timeouts, and cancellation
//! belong to the caller's implementation of this trait.

use crate::content::{ContentBlock, Turn};
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use tracing::debug;

/// A one-shot generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Synthetic conversation to send, oldest first.
    pub messages: Vec<Turn>,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Extended-thinking budget. Summaries always send 0.
    pub thinking_tokens: u32,
}

impl GenerateRequest {
    /// The concatenated text of every `TextPrompt` in the request, in order.
    pub fn prompt_text(&self) -> String {
        let mut out = String::new();
        for block in self.messages.iter().flatten() {
            if let ContentBlock::TextPrompt { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }
}

/// Produces model output for a request.
///
/// Blocking from the engine's point of view. Errors are plain strings; the
/// summarizing strategy turns them into a fallback summary and never
/// propagates them.
pub trait ModelCaller: Send + Sync {
    fn generate(&self, request: &GenerateRequest) -> Result<Vec<ContentBlock>, String>;
}

/// A model caller backed by a closure.
///
/// # Example
///
/// ```
/// use ctxkeep::content::ContentBlock;
/// use ctxkeep::model::{FnModelCaller, GenerateRequest, ModelCaller};
///
/// let model = FnModelCaller::new(|_req: &GenerateRequest| {
///     Ok(vec![ContentBlock::result("short summary")])
/// });
/// let request = GenerateRequest { messages: vec![], max_tokens: 10, thinking_tokens: 0 };
/// assert_eq!(model.generate(&request).unwrap().len(), 1);
/// ```
pub struct FnModelCaller<F>(F)
where
    F: Fn(&GenerateRequest) -> Result<Vec<ContentBlock>, String> + Send + Sync;

impl<F> FnModelCaller<F>
where
    F: Fn(&GenerateRequest) -> Result<Vec<ContentBlock>, String> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ModelCaller for FnModelCaller<F>
where
    F: Fn(&GenerateRequest) -> Result<Vec<ContentBlock>, String> + Send + Sync,
{
    fn generate(&self, request: &GenerateRequest) -> Result<Vec<ContentBlock>, String> {
        (self.0)(request)
    }
}

/// A model caller that pipes the prompt into a shell command and treats its
/// stdout as the generated text.
///
/// Lets the CLI plug any local model runner in (`llm`, `ollama run ...`, a
/// script wrapping an HTTP API) without this crate owning a provider client.
/// The request's `max_tokens` is exported as `CTXKEEP_MAX_TOKENS`.
#[derive(Debug, Clone)]
pub struct CommandModelCaller {
    command: String,
}

impl CommandModelCaller {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ModelCaller for CommandModelCaller {
    fn generate(&self, request: &GenerateRequest) -> Result<Vec<ContentBlock>, String> {
        let prompt = request.prompt_text();
        debug!(
            "Running summary command '{}' ({} prompt bytes)",
            self.command,
            prompt.len()
        );

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("CTXKEEP_MAX_TOKENS", request.max_tokens.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn '{}': {e}", self.command))?;

        // Feed stdin from a separate thread so a command that streams its
        // output can't deadlock against a full stdout pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || match stdin.write_all(prompt.as_bytes()) {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            })
        });

        let output = child
            .wait_with_output()
            .map_err(|e| format!("failed to wait for '{}': {e}", self.command))?;

        if let Some(handle) = writer
            && let Ok(Err(e)) = handle.join()
        {
            return Err(format!("failed to write prompt to '{}': {e}", self.command));
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(vec![ContentBlock::result(text)])
    }
}
