//! Write gate for irreversible side effects.
//!
//! File mutation and commits are only permitted when independently-set flags
//! line up. The decision is pure so the pipeline and the CLI agree on it.

use serde::{Deserialize, Serialize};

pub const CONFIRMATION_DISABLED: &str = "write requested but blocked — confirmation disabled.";
pub const SELF_EDIT_CONFIRMATION_REQUIRED: &str = "self-edit write blocked: explicit self-edit write confirmation required in addition to global write + auto-confirm.";

/// The three independent write flags supplied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFlags {
    /// Global write permission (`--allow-git-write`).
    pub allow_write: bool,
    /// Skip the interactive confirmation (`--auto-confirm`).
    pub auto_confirm: bool,
    /// Extra confirmation for self-edit file writes (`--confirm-self-edit-write`).
    pub confirm_self_edit_write: bool,
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteDecision {
    pub commit: bool,
    pub self_edit_write: bool,
    pub guardrail: Option<String>,
}

impl WriteDecision {
    /// True when nothing was requested (plain dry-run).
    pub fn is_dry_run(&self) -> bool {
        !self.commit && !self.self_edit_write && self.guardrail.is_none()
    }
}

/// Decide which writes are permitted.
///
/// Precedence: no global write -> dry-run; write without auto-confirm ->
/// everything blocked; self-edit enabled without its own confirmation -> files
/// blocked but commit still allowed; otherwise everything allowed.
pub fn decide(flags: WriteFlags, self_edit_enabled: bool) -> WriteDecision {
    if !flags.allow_write {
        return WriteDecision {
            commit: false,
            self_edit_write: false,
            guardrail: None,
        };
    }
    if !flags.auto_confirm {
        return WriteDecision {
            commit: false,
            self_edit_write: false,
            guardrail: Some(CONFIRMATION_DISABLED.to_string()),
        };
    }
    if self_edit_enabled && !flags.confirm_self_edit_write {
        return WriteDecision {
            commit: true,
            self_edit_write: false,
            guardrail: Some(SELF_EDIT_CONFIRMATION_REQUIRED.to_string()),
        };
    }
    WriteDecision {
        commit: true,
        self_edit_write: true,
        guardrail: None,
    }
}
