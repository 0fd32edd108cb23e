//! Errors surfaced at the run-invocation boundary.

use thiserror::Error;

use crate::core::state::{Event, Stage};
use crate::exit_codes;
use crate::io::agent::AgentError;

#[derive(Debug, Error)]
pub enum RunError {
    /// Provider settings are missing or invalid. Raised before any stage runs
    /// or when an agent reports a configuration problem mid-run; `events`
    /// holds whatever was emitted before it.
    #[error("configuration error: {message}")]
    Configuration { message: String, events: Vec<Event> },

    /// A stage's agent call failed. `events` holds everything emitted before it.
    #[error("agent invocation failed during {stage}: {source:#}")]
    AgentInvocation {
        stage: Stage,
        events: Vec<Event>,
        #[source]
        source: anyhow::Error,
    },

    #[error("no checkpoint for thread '{0}'")]
    UnknownThread(String),
}

impl RunError {
    /// Configuration error raised before any stage ran.
    pub fn configuration(message: impl Into<String>) -> Self {
        RunError::Configuration {
            message: message.into(),
            events: Vec::new(),
        }
    }

    /// Map an agent failure at `stage` into the run taxonomy.
    pub fn from_agent(err: AgentError, stage: Stage, events: Vec<Event>) -> Self {
        match err {
            AgentError::Configuration(message) => RunError::Configuration { message, events },
            AgentError::Invocation(source) => RunError::AgentInvocation {
                stage,
                events,
                source,
            },
        }
    }

    /// Events emitted before the failure.
    pub fn events(&self) -> &[Event] {
        match self {
            RunError::AgentInvocation { events, .. } | RunError::Configuration { events, .. } => {
                events
            }
            RunError::UnknownThread(_) => &[],
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Configuration { .. } => exit_codes::CONFIG,
            RunError::AgentInvocation { .. } => exit_codes::RUNTIME,
            RunError::UnknownThread(_) => exit_codes::INVALID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::EventKind;

    #[test]
    fn invocation_failure_keeps_prior_events() {
        let events = vec![Event::new(Stage::Critique, EventKind::Output, "roast")];
        let err = RunError::from_agent(
            AgentError::Invocation(anyhow::anyhow!("timeout")),
            Stage::Build,
            events.clone(),
        );
        assert_eq!(err.events(), events.as_slice());
        assert_eq!(err.exit_code(), exit_codes::RUNTIME);
        assert!(err.to_string().contains("during build"));
    }

    #[test]
    fn configuration_failure_maps_to_config_exit_code_and_keeps_events() {
        let events = vec![Event::new(Stage::Critique, EventKind::Output, "roast")];
        let err = RunError::from_agent(
            AgentError::Configuration("Missing required environment variable: XAI_API_KEY".into()),
            Stage::Build,
            events.clone(),
        );
        assert!(matches!(err, RunError::Configuration { .. }));
        assert_eq!(err.events(), events.as_slice());
        assert_eq!(err.exit_code(), exit_codes::CONFIG);
        assert!(RunError::configuration("bad").events().is_empty());
    }
}
