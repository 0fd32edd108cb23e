//! Run state threaded through the pipeline and the event log it produces.
//!
//! A [`RunState`] is created once per invocation and mutated in place by each
//! stage. Stages only write their own output field and then call
//! [`RunState::advance`], which moves `active` to the next stage in the fixed
//! order. Fields for stages not reached yet keep their empty initial value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::gate::WriteFlags;

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Critique,
    Build,
    Verify,
    SelfEdit,
    Deliver,
    Done,
}

impl Stage {
    /// Every stage that does work, in the order the engine visits them.
    pub const ORDER: [Stage; 5] = [
        Stage::Critique,
        Stage::Build,
        Stage::Verify,
        Stage::SelfEdit,
        Stage::Deliver,
    ];

    /// The stage that follows `self`. `Done` is terminal.
    pub fn next(self) -> Stage {
        match self {
            Stage::Critique => Stage::Build,
            Stage::Build => Stage::Verify,
            Stage::Verify => Stage::SelfEdit,
            Stage::SelfEdit => Stage::Deliver,
            Stage::Deliver | Stage::Done => Stage::Done,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Critique => "critique",
            Stage::Build => "build",
            Stage::Verify => "verify",
            Stage::SelfEdit => "self-edit",
            Stage::Deliver => "deliver",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an event carries, beyond the stage that emitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Text produced by the stage's agent (or the self-edit disabled sentinel).
    Output,
    /// Simulated diff preview of self-edit proposals.
    DiffPreview,
    /// Write-gate outcome for self-edit file mutation.
    Guardrail,
    /// Result of executing (or refusing to execute) the delivery plan.
    DeliveryResult,
}

/// One append-only entry of the run's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub stage: Stage,
    pub kind: EventKind,
    pub content: String,
}

impl Event {
    pub fn new(stage: Stage, kind: EventKind, content: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            content: content.into(),
        }
    }

    /// Label used when rendering the log (`build`, `self-edit/preview`, ...).
    pub fn label(&self) -> String {
        match self.kind {
            EventKind::Output => self.stage.as_str().to_string(),
            EventKind::DiffPreview => format!("{}/preview", self.stage),
            EventKind::Guardrail => format!("{}/guardrail", self.stage),
            EventKind::DeliveryResult => format!("{}/result", self.stage),
        }
    }
}

/// The single mutable record threaded through one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub goal: String,
    pub active: Stage,
    pub critique: String,
    pub build: String,
    pub verify: String,
    pub self_edit: String,
    pub delivery_plan: String,
    pub delivery_result: String,
    pub flags: WriteFlags,
    pub self_edit_enabled: bool,
    /// Requested self-edit iterations (never below 1).
    pub self_edit_iterations: u32,
    /// Files changed by the patch applier, relative to the repo root.
    pub applied_patches: Vec<String>,
    pub diff_preview: String,
    pub guardrail_note: String,
    pub search_context: String,
}

impl RunState {
    pub fn new(
        goal: impl Into<String>,
        flags: WriteFlags,
        self_edit_enabled: bool,
        self_edit_iterations: u32,
        search_context: impl Into<String>,
    ) -> Self {
        Self {
            goal: goal.into(),
            active: Stage::Critique,
            critique: String::new(),
            build: String::new(),
            verify: String::new(),
            self_edit: String::new(),
            delivery_plan: String::new(),
            delivery_result: String::new(),
            flags,
            self_edit_enabled,
            self_edit_iterations: self_edit_iterations.max(1),
            applied_patches: Vec::new(),
            diff_preview: String::new(),
            guardrail_note: String::new(),
            search_context: search_context.into(),
        }
    }

    /// Move to the next stage and return it.
    pub fn advance(&mut self) -> Stage {
        self.active = self.active.next();
        self.active
    }

    pub fn is_done(&self) -> bool {
        self.active == Stage::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RunState {
        RunState::new("goal", WriteFlags::default(), false, 1, "ctx")
    }

    #[test]
    fn advance_walks_fixed_order_then_stays_done() {
        let mut state = state();
        let mut visited = vec![state.active];
        while !state.is_done() {
            visited.push(state.advance());
        }
        assert_eq!(
            visited,
            vec![
                Stage::Critique,
                Stage::Build,
                Stage::Verify,
                Stage::SelfEdit,
                Stage::Deliver,
                Stage::Done,
            ]
        );
        assert_eq!(state.advance(), Stage::Done);
    }

    #[test]
    fn iterations_are_floored_at_one() {
        let state = RunState::new("goal", WriteFlags::default(), true, 0, "");
        assert_eq!(state.self_edit_iterations, 1);
    }

    #[test]
    fn new_state_has_empty_stage_outputs() {
        let state = state();
        assert_eq!(state.active, Stage::Critique);
        assert!(state.critique.is_empty());
        assert!(state.delivery_result.is_empty());
        assert!(state.applied_patches.is_empty());
        assert_eq!(state.search_context, "ctx");
    }

    #[test]
    fn event_labels_include_kind() {
        let event = Event::new(Stage::SelfEdit, EventKind::DiffPreview, "x");
        assert_eq!(event.label(), "self-edit/preview");
        let event = Event::new(Stage::Build, EventKind::Output, "x");
        assert_eq!(event.label(), "build");
    }
}
