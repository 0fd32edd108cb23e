//! Stage roles: persona, response sections and request rendering.
//!
//! Every stage talks to the same [`Agent`]; only the role differs.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::core::state::{RunState, Stage};
use crate::io::agent::{Agent, AgentError, AgentRequest, CommandAgent};
use crate::io::config::{AgentBackend, SwarmConfig};
use crate::io::prompt::PromptBuilder;
use crate::io::provider::{HttpAgent, ProviderSettings};

/// Persona and response contract for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Role {
    pub stage: Stage,
    pub persona: &'static str,
    /// Markdown sections the response must contain, in order.
    pub sections: &'static [&'static str],
}

pub const CRITIQUE: Role = Role {
    stage: Stage::Critique,
    persona: "You are the critic of a small software delivery team.\n\
              Be blunt and have no patience for vague goals.\n\
              Point out what is weak about the goal, then set a strategy the builder can ship.",
    sections: &["Critique", "Strategy", "Handoff"],
};

pub const BUILD: Role = Role {
    stage: Stage::Build,
    persona: "You are the builder.\n\
              Turn the critique's strategy into a practical implementation plan.\n\
              Name concrete files and changes.",
    sections: &["Build Plan", "Proposed File Changes", "Handoff"],
};

pub const VERIFY: Role = Role {
    stage: Stage::Verify,
    persona: "You are the verifier.\n\
              Check the build plan against the repository context and reduce nonsense.\n\
              Be blunt but precise. Claims without evidence go under Needs Evidence.",
    sections: &["Verified", "Needs Evidence", "Risks", "Handoff"],
};

pub const SELF_EDIT: Role = Role {
    stage: Stage::SelfEdit,
    persona: "You design safe self-improvement loops for this repository.\n\
              Propose small, reviewable edits. Do not pretend files were modified.",
    sections: &[
        "Self-Edit Loop Plan",
        "First Iteration Patch Targets",
        "Safety Guardrails",
        "Handoff",
    ],
};

pub const DELIVER: Role = Role {
    stage: Stage::Deliver,
    persona: "You own git strategy and delivery hygiene.\n\
              Pick a short branch name and a conventional commit message.",
    sections: &["Branch Name", "Commit Message", "PR Title", "Merge Checklist"],
};

/// The role for `stage`, or `None` for `Done`.
pub fn role_for(stage: Stage) -> Option<&'static Role> {
    match stage {
        Stage::Critique => Some(&CRITIQUE),
        Stage::Build => Some(&BUILD),
        Stage::Verify => Some(&VERIFY),
        Stage::SelfEdit => Some(&SELF_EDIT),
        Stage::Deliver => Some(&DELIVER),
        Stage::Done => None,
    }
}

impl Role {
    /// Render the request this role sends for the current state.
    pub fn request(&self, prompts: &PromptBuilder, state: &RunState) -> Result<AgentRequest> {
        let prompt = prompts.render(self.stage, state, self.sections)?;
        Ok(AgentRequest {
            stage: self.stage,
            system: self.persona.to_string(),
            prompt,
        })
    }
}

/// Build the configured agent backend.
///
/// HTTP settings are resolved here, so a missing API key surfaces as a
/// configuration error before any stage runs.
pub fn build_agent<F>(cfg: &SwarmConfig, root: &Path, env: F) -> Result<Box<dyn Agent>, AgentError>
where
    F: Fn(&str) -> Option<String>,
{
    match cfg.agent.backend {
        AgentBackend::Http => {
            let settings = ProviderSettings::resolve(&cfg.agent, env)?;
            Ok(Box::new(HttpAgent::new(settings)?))
        }
        AgentBackend::Command => Ok(Box::new(CommandAgent::new(
            cfg.agent.command.clone(),
            root,
            Duration::from_secs(cfg.agent.timeout_secs),
            cfg.agent.output_limit_bytes,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gate::WriteFlags;

    #[test]
    fn every_working_stage_has_a_role() {
        for stage in Stage::ORDER {
            let role = role_for(stage).expect("role");
            assert_eq!(role.stage, stage);
            assert!(!role.sections.is_empty());
        }
        assert!(role_for(Stage::Done).is_none());
    }

    #[test]
    fn request_carries_persona_and_contract() {
        let prompts = PromptBuilder::new(10_000).expect("prompts");
        let state = RunState::new("Ship it", WriteFlags::default(), false, 1, "");
        let request = DELIVER.request(&prompts, &state).expect("request");
        assert_eq!(request.stage, Stage::Deliver);
        assert!(request.system.contains("delivery hygiene"));
        assert!(request.prompt.contains("1) Branch Name"));
        assert!(request.prompt.contains("4) Merge Checklist"));
    }

    #[test]
    fn http_backend_without_key_is_a_configuration_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = build_agent(&SwarmConfig::default(), temp.path(), |_| None)
            .err()
            .expect("missing key");
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[test]
    fn command_backend_builds_without_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cfg = SwarmConfig::default();
        cfg.agent.backend = AgentBackend::Command;
        let agent = build_agent(&cfg, temp.path(), |_| None).expect("agent");
        assert!(agent.preflight().is_ok());
    }
}
