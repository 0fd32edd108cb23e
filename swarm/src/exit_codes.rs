//! Stable exit codes for swarm CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid usage, unreadable input or an unknown thread.
pub const INVALID: i32 = 1;
/// Provider or config file settings are missing or invalid.
pub const CONFIG: i32 = 2;
/// An agent call failed mid-run.
pub const RUNTIME: i32 = 3;
