//! Side-effecting collaborators of the pipeline.

pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod git;
pub mod patcher;
pub mod process;
pub mod prompt;
pub mod provider;
pub mod search;
