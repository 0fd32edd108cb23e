//! Pure, deterministic pipeline logic.
//!
//! Nothing here touches the filesystem, git or the network; the orchestration in
//! [`crate::pipeline`] feeds these functions and applies their results.

pub mod gate;
pub mod patch;
pub mod plan;
pub mod preview;
pub mod state;
pub mod transform;
