//! Exit code constants for the billing-jobs CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, uninitialized data directory)
//! - 2: Validation failure (empty batch, unknown target, malformed period)
//! - 3: Store failure (persistence unavailable or corrupt)
//! - 4: Lock unavailable (another holder is inside the critical section)
//! - 5: Duplicate job conflict (a live job already covers the target)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid local state.
pub const USER_ERROR: i32 = 1;

/// Validation failure: malformed or unknown input.
pub const VALIDATION_FAILURE: i32 = 2;

/// Store failure: the underlying persistence call failed.
pub const STORE_FAILURE: i32 = 3;

/// Lock acquisition failure: the resource lock is held elsewhere.
pub const LOCK_FAILURE: i32 = 4;

/// A pending or in-progress job already exists for a requested target.
pub const DUPLICATE_JOB: i32 = 5;
