//! Unified exit codes. Part of the public contract for scripted use.

pub const SUCCESS: i32 = 0;
pub const MODULE_FAILED: i32 = 1; // At least one module could not be processed
pub const INTERNAL_ERROR: i32 = 2; // Invalid invocation or session-integrity failure
