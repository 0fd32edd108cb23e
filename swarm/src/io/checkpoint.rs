//! In-memory checkpoints of run state, keyed by thread id.
//!
//! A checkpoint lives as long as the engine that owns it. Nothing is shared
//! across processes.

use std::collections::HashMap;

use tracing::debug;

use crate::core::state::RunState;

#[derive(Debug, Default)]
pub struct CheckpointStore {
    states: HashMap<String, RunState>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `state` for `thread_id`, replacing any previous checkpoint.
    pub fn save(&mut self, thread_id: &str, state: &RunState) {
        debug!(thread_id, stage = %state.active, "checkpoint saved");
        self.states.insert(thread_id.to_string(), state.clone());
    }

    pub fn load(&self, thread_id: &str) -> Option<&RunState> {
        self.states.get(thread_id)
    }
}
