//! Agent abstraction for text generation.
//!
//! The [`Agent`] trait decouples the pipeline from the backend that produces
//! text. Every stage talks to the same synchronous text-in/text-out contract;
//! tests use scripted agents that return canned text without any I/O.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::state::Stage;
use crate::io::process::run_command_with_timeout;

/// A rendered prompt for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    /// Stage the request is made for.
    pub stage: Stage,
    /// Persona and output contract.
    pub system: String,
    /// Stage inputs rendered from the prompt template.
    pub prompt: String,
}

/// Failures reported by an agent backend.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Settings are missing or invalid; retrying will not help.
    #[error("{0}")]
    Configuration(String),
    /// The call itself failed (network, provider, process).
    #[error(transparent)]
    Invocation(#[from] anyhow::Error),
}

/// Abstraction over text-generation backends.
pub trait Agent {
    /// Produce the text for `request`.
    fn invoke(&self, request: &AgentRequest) -> Result<String, AgentError>;

    /// Check settings before any stage runs.
    fn preflight(&self) -> Result<(), AgentError> {
        Ok(())
    }
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn invoke(&self, request: &AgentRequest) -> Result<String, AgentError> {
        (**self).invoke(request)
    }

    fn preflight(&self) -> Result<(), AgentError> {
        (**self).preflight()
    }
}

/// Agent that spawns a CLI, writes the prompt to stdin and reads text from stdout.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    argv: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandAgent {
    pub fn new(
        argv: Vec<String>,
        workdir: impl Into<PathBuf>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            argv,
            workdir: workdir.into(),
            timeout,
            output_limit_bytes,
        }
    }

    fn render_stdin(request: &AgentRequest) -> String {
        format!("{}\n\n---\n\n{}\n", request.system.trim(), request.prompt.trim())
    }
}

impl Agent for CommandAgent {
    #[instrument(skip_all, fields(stage = %request.stage, timeout_secs = self.timeout.as_secs()))]
    fn invoke(&self, request: &AgentRequest) -> Result<String, AgentError> {
        self.preflight()?;
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| AgentError::Configuration("agent.command is empty".to_string()))?;
        info!(program = %program, "starting agent command");

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        let stdin = Self::render_stdin(request);
        let output = run_command_with_timeout(
            cmd,
            Some(stdin.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| AgentError::Invocation(err.context(format!("run {program}"))))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "agent command timed out");
            return Err(AgentError::Invocation(anyhow::anyhow!(
                "{program} timed out after {:?}",
                self.timeout
            )));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent command failed");
            return Err(AgentError::Invocation(anyhow::anyhow!(
                "{program} failed with status {:?}: {}",
                output.status.code(),
                output.stderr_tail()
            )));
        }

        let text = output.stdout_lossy().trim().to_string();
        if text.is_empty() {
            return Err(AgentError::Invocation(anyhow::anyhow!(
                "{program} produced no output"
            )));
        }
        debug!(bytes = text.len(), "agent command completed");
        Ok(text)
    }

    fn preflight(&self) -> Result<(), AgentError> {
        match self.argv.first() {
            Some(program) if !program.trim().is_empty() => Ok(()),
            _ => Err(AgentError::Configuration(
                "agent.command must be a non-empty array".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AgentRequest {
        AgentRequest {
            stage: Stage::Build,
            system: "system".to_string(),
            prompt: "prompt".to_string(),
        }
    }

    #[test]
    fn empty_command_is_a_configuration_error() {
        let agent = CommandAgent::new(Vec::new(), ".", Duration::from_secs(1), 1024);
        let err = agent.invoke(&request()).unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[cfg(unix)]
    #[test]
    fn echoes_prompt_through_cat() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = CommandAgent::new(
            vec!["cat".to_string()],
            temp.path(),
            Duration::from_secs(5),
            4096,
        );
        let text = agent.invoke(&request()).expect("invoke");
        assert!(text.starts_with("system"));
        assert!(text.ends_with("prompt"));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_an_invocation_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = CommandAgent::new(
            vec!["false".to_string()],
            temp.path(),
            Duration::from_secs(5),
            4096,
        );
        let err = agent.invoke(&request()).unwrap_err();
        assert!(matches!(err, AgentError::Invocation(_)));
    }

    #[test]
    fn missing_program_is_an_invocation_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = CommandAgent::new(
            vec!["swarm-test-no-such-program".to_string()],
            temp.path(),
            Duration::from_secs(5),
            4096,
        );
        let err = agent.invoke(&request()).unwrap_err();
        assert!(matches!(err, AgentError::Invocation(_)));
    }
}
