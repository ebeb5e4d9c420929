//! Stable exit codes for `genloop` commands.

/// Command succeeded. For `run`, the pipeline finished (whatever the final
/// iteration status) and reports were written.
pub const OK: i32 = 0;
/// Invalid input or config, or a failure before any report could be written.
pub const INVALID: i32 = 1;
