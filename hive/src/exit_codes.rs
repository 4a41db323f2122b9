//! Stable exit codes for hive CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, arguments, or any other error.
pub const INVALID: i32 = 1;
/// The sandbox health check failed.
pub const UNHEALTHY: i32 = 2;
/// The model backend could not be reached.
pub const MODEL_UNAVAILABLE: i32 = 3;
