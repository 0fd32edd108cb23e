//! Staged agent pipeline with gated repository writes.
//!
//! A run walks a fixed sequence of agent roles (Critique, Build, Verify,
//! SelfEdit, Deliver) over one goal. Only two stages touch the repository:
//! SelfEdit may apply small source transforms and Deliver may commit, and both
//! are gated by independent write flags.
//!
//! - **[`core`]**: Pure logic (patch extraction, transforms, plan parsing,
//!   write gate, run state). No I/O.
//! - **[`io`]**: Side effects (filesystem, git, HTTP, child processes).
//!
//! [`pipeline`] wires the two together behind [`pipeline::Engine`].

pub mod agents;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
