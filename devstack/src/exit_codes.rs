//! Stable exit codes for devstack CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// A precondition or provisioning step failed.
pub const FAILED: i32 = 1;
/// The stack was launched but generated files could not be handed back.
pub const OWNERSHIP_FAILED: i32 = 2;
