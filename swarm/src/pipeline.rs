//! Orchestration engine: Critique -> Build -> Verify -> SelfEdit -> Deliver -> Done.
//!
//! The engine is built once with its collaborators and then drives one
//! [`RunState`] per invocation through the fixed stage order. Stage functions
//! mutate only their own fields and append to the event log; the loop in
//! [`Engine::drive`] is the only place that advances the active stage.
//!
//! Agent failures abort the run and return the events emitted so far. Patch
//! and version-control failures are recovered inside their stage and reported
//! as text.

use std::path::PathBuf;

use anyhow::anyhow;
use tracing::{debug, info, instrument, warn};

use crate::agents::role_for;
use crate::core::gate::{WriteDecision, WriteFlags, decide};
use crate::core::patch::applied_note;
use crate::core::plan::{GitPlan, parse_git_plan};
use crate::core::preview::render_diff_preview;
use crate::core::state::{Event, EventKind, RunState, Stage};
use crate::error::RunError;
use crate::io::agent::{Agent, AgentError};
use crate::io::checkpoint::CheckpointStore;
use crate::io::git::VersionControl;
use crate::io::patcher::apply_self_edit_patches;
use crate::io::prompt::PromptBuilder;
use crate::io::search::RepoSearch;

/// Self-edit output when the loop is not enabled.
pub const SELF_EDIT_DISABLED: &str = "Self-edit loop disabled for this run";

/// Guardrail note when self-edit ran without write permission.
pub const SELF_EDIT_DRY_RUN: &str = "Dry-run: self-edit recommendations were not applied.";

/// Length of the commit id shown in delivery summaries.
const SHORT_ID_LEN: usize = 7;

/// Inputs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub goal: String,
    /// Checkpoint key; reusing it replaces the previous checkpoint.
    pub thread_id: String,
    pub flags: WriteFlags,
    pub enable_self_edit: bool,
    pub self_edit_iterations: u32,
}

impl RunRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            thread_id: "default".to_string(),
            flags: WriteFlags::default(),
            enable_self_edit: false,
            self_edit_iterations: 1,
        }
    }
}

/// Ordered event log plus the final state of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub events: Vec<Event>,
    pub state: RunState,
}

pub struct Engine<A, V, S> {
    agent: A,
    vcs: V,
    search: S,
    root: PathBuf,
    prompts: PromptBuilder,
    checkpoints: CheckpointStore,
}

impl<A: Agent, V: VersionControl, S: RepoSearch> Engine<A, V, S> {
    pub fn new(agent: A, vcs: V, search: S, root: impl Into<PathBuf>, prompts: PromptBuilder) -> Self {
        Self {
            agent,
            vcs,
            search,
            root: root.into(),
            prompts,
            checkpoints: CheckpointStore::new(),
        }
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Last stored state for `thread_id`.
    pub fn checkpoint(&self, thread_id: &str) -> Option<&RunState> {
        self.checkpoints.load(thread_id)
    }

    /// Run the full pipeline for `request`.
    #[instrument(skip_all, fields(thread_id = %request.thread_id))]
    pub fn run(&mut self, request: &RunRequest) -> Result<RunOutcome, RunError> {
        self.preflight()?;
        let search_context = self.search.search(&request.goal, &self.root);
        debug!(bytes = search_context.len(), "search context collected");
        let state = RunState::new(
            request.goal.clone(),
            request.flags,
            request.enable_self_edit,
            request.self_edit_iterations,
            search_context,
        );
        self.drive(&request.thread_id, state)
    }

    /// Continue a checkpointed run from its active stage.
    ///
    /// Returns only the events emitted by this call. A finished run yields no
    /// events and its stored state.
    #[instrument(skip_all, fields(thread_id = %thread_id))]
    pub fn resume(&mut self, thread_id: &str) -> Result<RunOutcome, RunError> {
        let state = self
            .checkpoints
            .load(thread_id)
            .cloned()
            .ok_or_else(|| RunError::UnknownThread(thread_id.to_string()))?;
        if !state.is_done() {
            self.preflight()?;
            info!(stage = %state.active, "resuming run");
        }
        self.drive(thread_id, state)
    }

    fn preflight(&self) -> Result<(), RunError> {
        self.agent.preflight().map_err(|err| match err {
            AgentError::Configuration(msg) => RunError::configuration(msg),
            AgentError::Invocation(source) => RunError::configuration(format!("{source:#}")),
        })
    }

    fn drive(&mut self, thread_id: &str, mut state: RunState) -> Result<RunOutcome, RunError> {
        let mut events = Vec::new();
        while !state.is_done() {
            let stage = state.active;
            info!(%stage, "stage started");
            let result = match stage {
                Stage::Critique => self.critique(&mut state, &mut events),
                Stage::Build => self.build(&mut state, &mut events),
                Stage::Verify => self.verify(&mut state, &mut events),
                Stage::SelfEdit => self.self_edit(&mut state, &mut events),
                Stage::Deliver => self.deliver(&mut state, &mut events),
                Stage::Done => Ok(()),
            };
            if let Err(err) = result {
                warn!(%stage, error = %err, "stage failed; aborting run");
                self.checkpoints.save(thread_id, &state);
                return Err(RunError::from_agent(err, stage, events));
            }
            state.advance();
        }
        info!(events = events.len(), "run finished");
        self.checkpoints.save(thread_id, &state);
        Ok(RunOutcome { events, state })
    }

    fn ask(&self, state: &RunState) -> Result<String, AgentError> {
        let role = role_for(state.active)
            .ok_or_else(|| AgentError::Invocation(anyhow!("no role for stage {}", state.active)))?;
        let request = role.request(&self.prompts, state)?;
        debug!(prompt_bytes = request.prompt.len(), "invoking agent");
        self.agent.invoke(&request)
    }

    #[instrument(skip_all)]
    fn critique(&self, state: &mut RunState, events: &mut Vec<Event>) -> Result<(), AgentError> {
        state.critique = self.ask(state)?;
        events.push(Event::new(Stage::Critique, EventKind::Output, &state.critique));
        Ok(())
    }

    #[instrument(skip_all)]
    fn build(&self, state: &mut RunState, events: &mut Vec<Event>) -> Result<(), AgentError> {
        state.build = self.ask(state)?;
        events.push(Event::new(Stage::Build, EventKind::Output, &state.build));
        Ok(())
    }

    #[instrument(skip_all)]
    fn verify(&self, state: &mut RunState, events: &mut Vec<Event>) -> Result<(), AgentError> {
        state.verify = self.ask(state)?;
        events.push(Event::new(Stage::Verify, EventKind::Output, &state.verify));
        Ok(())
    }

    #[instrument(skip_all, fields(iterations = state.self_edit_iterations))]
    fn self_edit(&self, state: &mut RunState, events: &mut Vec<Event>) -> Result<(), AgentError> {
        if !state.self_edit_enabled {
            state.self_edit = SELF_EDIT_DISABLED.to_string();
            events.push(Event::new(Stage::SelfEdit, EventKind::Output, SELF_EDIT_DISABLED));
            return Ok(());
        }

        state.self_edit = self.ask(state)?;
        events.push(Event::new(Stage::SelfEdit, EventKind::Output, &state.self_edit));

        state.diff_preview = render_diff_preview(&state.self_edit);
        if !state.diff_preview.is_empty() {
            events.push(Event::new(
                Stage::SelfEdit,
                EventKind::DiffPreview,
                &state.diff_preview,
            ));
        }

        let decision = decide(state.flags, true);
        state.guardrail_note = if decision.self_edit_write {
            state.applied_patches = apply_self_edit_patches(&state.self_edit, &self.root);
            info!(applied = state.applied_patches.len(), "self-edit patches written");
            applied_note(&state.applied_patches)
        } else if let Some(message) = decision.guardrail {
            warn!("self-edit write blocked");
            message
        } else {
            SELF_EDIT_DRY_RUN.to_string()
        };
        events.push(Event::new(
            Stage::SelfEdit,
            EventKind::Guardrail,
            &state.guardrail_note,
        ));
        Ok(())
    }

    #[instrument(skip_all)]
    fn deliver(&self, state: &mut RunState, events: &mut Vec<Event>) -> Result<(), AgentError> {
        state.delivery_plan = self.ask(state)?;
        events.push(Event::new(Stage::Deliver, EventKind::Output, &state.delivery_plan));

        let plan = parse_git_plan(&state.delivery_plan);
        let decision = decide(state.flags, state.self_edit_enabled);
        state.delivery_result = execute_plan(&self.vcs, &plan, &decision);
        events.push(Event::new(
            Stage::Deliver,
            EventKind::DeliveryResult,
            &state.delivery_result,
        ));
        Ok(())
    }
}

/// Execute a delivery plan under `decision` and describe what happened.
///
/// The version-control capability is only touched when the commit is
/// permitted. Its failures are reported in the returned text.
pub fn execute_plan<V: VersionControl>(vcs: &V, plan: &GitPlan, decision: &WriteDecision) -> String {
    let mode = if decision.commit { "write" } else { "dry-run" };
    let mut out = format!(
        "Branch Name: {}\nCommit Message: {}\nMode: {mode}\n",
        plan.branch, plan.commit_message
    );

    if decision.is_dry_run() {
        out.push_str("Action: Dry-run only. No git changes were applied.");
        return out;
    }
    let guardrail = decision.guardrail.as_deref().unwrap_or_default();
    if !decision.commit {
        out.push_str(&format!("Action: Blocked. {guardrail}"));
        return out;
    }
    if !guardrail.is_empty() {
        out.push_str(&format!("Guardrail: {guardrail}\n"));
    }

    match commit_plan(vcs, plan) {
        Ok(None) => out.push_str("Action: No changes to commit."),
        Ok(Some(commit_id)) => {
            info!(branch = %plan.branch, commit = %commit_id, "delivery committed");
            out.push_str(&post_commit_summary(plan, &commit_id, vcs.remote_url()));
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "version control failed");
            out.push_str(&format!("Action: Git command failed: {err:#}"));
        }
    }
    out
}

fn commit_plan<V: VersionControl>(vcs: &V, plan: &GitPlan) -> anyhow::Result<Option<String>> {
    vcs.create_or_switch_branch(&plan.branch)?;
    vcs.stage_all()?;
    if !vcs.is_dirty()? {
        return Ok(None);
    }
    vcs.commit(&plan.commit_message).map(Some)
}

fn post_commit_summary(plan: &GitPlan, commit_id: &str, remote: Option<String>) -> String {
    let short: String = commit_id.chars().take(SHORT_ID_LEN).collect();
    let remote = remote.unwrap_or_else(|| "not configured".to_string());
    format!(
        "Action: Branch created/updated and commit written.\n\
         Commit: {short}\n\
         Branch: {branch}\n\
         Message: {message}\n\
         Remote: {remote}\n\
         Next steps (manual, not executed):\n\
         - Review: git show {short}\n\
         - Push: git push -u origin {branch}\n\
         - Open PR: gh pr create",
        branch = plan.branch,
        message = plan.commit_message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingVcs;

    fn plan() -> GitPlan {
        GitPlan {
            branch: "feat/x".to_string(),
            commit_message: "feat: x".to_string(),
        }
    }

    fn allow_all() -> WriteDecision {
        decide(
            WriteFlags {
                allow_write: true,
                auto_confirm: true,
                confirm_self_edit_write: true,
            },
            true,
        )
    }

    #[test]
    fn dry_run_never_touches_vcs() {
        let vcs = RecordingVcs::new();
        let out = execute_plan(&vcs, &plan(), &decide(WriteFlags::default(), false));
        assert!(out.starts_with("Branch Name: feat/x\nCommit Message: feat: x\nMode: dry-run\n"));
        assert!(out.ends_with("Action: Dry-run only. No git changes were applied."));
        assert!(vcs.calls().is_empty());
    }

    #[test]
    fn blocked_write_reports_gate_message() {
        let vcs = RecordingVcs::new();
        let flags = WriteFlags {
            allow_write: true,
            ..WriteFlags::default()
        };
        let out = execute_plan(&vcs, &plan(), &decide(flags, false));
        assert!(out.contains("Action: Blocked. write requested but blocked"));
        assert!(vcs.calls().is_empty());
    }

    #[test]
    fn clean_tree_reports_no_changes() {
        let vcs = RecordingVcs::new();
        let out = execute_plan(&vcs, &plan(), &allow_all());
        assert!(out.ends_with("Action: No changes to commit."));
        assert_eq!(vcs.calls(), vec!["branch feat/x", "stage", "is_dirty"]);
    }

    #[test]
    fn commit_summary_lists_manual_next_steps() {
        let vcs = RecordingVcs::new().dirty();
        let out = execute_plan(&vcs, &plan(), &allow_all());
        assert!(out.contains("Mode: write"));
        assert!(out.contains("Commit: 0123456\n"));
        assert!(out.contains("git push -u origin feat/x"));
        assert!(out.contains("Remote: not configured"));
        assert_eq!(vcs.calls().last().map(String::as_str), Some("commit feat: x"));
    }

    #[test]
    fn vcs_failure_is_reported_not_raised() {
        let vcs = RecordingVcs::new().dirty().failing("index.lock exists");
        let out = execute_plan(&vcs, &plan(), &allow_all());
        assert!(out.contains("Action: Git command failed: index.lock exists"));
    }

    #[test]
    fn self_edit_guardrail_is_noted_on_commit() {
        let vcs = RecordingVcs::new().dirty();
        let flags = WriteFlags {
            allow_write: true,
            auto_confirm: true,
            confirm_self_edit_write: false,
        };
        let out = execute_plan(&vcs, &plan(), &decide(flags, true));
        assert!(out.contains("Guardrail: self-edit write blocked"));
        assert!(out.contains("commit written"));
    }
}
