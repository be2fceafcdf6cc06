//! Process exit codes
//!
//! Orchestrators only look at zero versus non-zero; the distinct values exist
//! so operators can tell the failure classes apart in logs and CI.

/// Success, or graceful shutdown after a termination signal
pub const OK: i32 = 0;
/// Unexpected error with no more specific class
pub const FAILURE: i32 = 1;
/// Invalid configuration or command-line usage
pub const CONFIG: i32 = 2;
/// Application target could not be resolved, constructed or started
pub const APP_IMPORT: i32 = 3;
/// Listening socket could not be bound
pub const BIND: i32 = 4;
/// Manifest, lock or installed-set failure
pub const BUILD_FAILURE: i32 = 5;
