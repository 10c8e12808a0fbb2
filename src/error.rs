//! Error types for billing-jobs.
//!
//! Uses thiserror for derive macros. Lock contention and duplicate jobs are
//! separate variants so callers can tell "system busy" from "already running"
//! without matching on message text.

use crate::exit_codes;
use crate::jobs::TargetRef;
use crate::store::StoreError;
use thiserror::Error;

/// Main error type for billing-jobs operations.
#[derive(Error, Debug)]
pub enum JobsError {
    /// User provided invalid arguments or local state is unusable.
    #[error("{0}")]
    UserError(String),

    /// Input was malformed, empty, or referenced an unknown target.
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// The named resource lock is held by someone else (or the store could
    /// not be reached while trying to take it).
    #[error("Lock unavailable for resource '{resource}': {reason}")]
    LockUnavailable { resource: String, reason: String },

    /// A pending or in-progress job already exists for one or more targets.
    #[error(
        "A job is already pending or in progress for: {}",
        join_target_names(.targets)
    )]
    DuplicateJobConflict { targets: Vec<TargetRef> },

    /// The underlying store failed for reasons unrelated to locking or dedup.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl JobsError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            JobsError::UserError(_) => exit_codes::USER_ERROR,
            JobsError::ValidationError(_) => exit_codes::VALIDATION_FAILURE,
            JobsError::LockUnavailable { .. } => exit_codes::LOCK_FAILURE,
            JobsError::DuplicateJobConflict { .. } => exit_codes::DUPLICATE_JOB,
            JobsError::StoreUnavailable(_) => exit_codes::STORE_FAILURE,
        }
    }

    /// Whether retrying the same call later could succeed without any
    /// other change in state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            JobsError::LockUnavailable { .. } | JobsError::StoreUnavailable(_)
        )
    }
}

impl From<StoreError> for JobsError {
    fn from(err: StoreError) -> Self {
        JobsError::StoreUnavailable(err.to_string())
    }
}

fn join_target_names(targets: &[TargetRef]) -> String {
    targets
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for billing-jobs operations.
pub type Result<T> = std::result::Result<T, JobsError>;
