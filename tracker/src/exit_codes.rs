//! Stable exit codes for the `eval` CLI.

/// Run completed, or a read-only command succeeded.
pub const OK: i32 = 0;
/// Invalid configuration, unreadable inputs, or another fatal error.
pub const INVALID: i32 = 1;
/// Run stopped by cancellation or deadline; the artifact holds partial results.
pub const INTERRUPTED: i32 = 2;
