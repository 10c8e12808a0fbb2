//! Persistent store collaborator.
//!
//! The lock and dedup logic never touches storage directly; it talks to the
//! traits below. The store must offer:
//! - point lookup of a lock row that reports "not found" distinctly
//! - exclusive create that reports "already exists" distinctly
//! - conditional single-row update keyed on the row version
//! - multi-row query of live jobs by kind and target-key membership
//!
//! `FileStore` is the directory-backed implementation used by the CLI.
//! `MemoryStore` (tests only) keeps everything in process and can inject
//! failures.

mod file;
#[cfg(test)]
pub mod memory;


pub use file::FileStore;

use crate::jobs::{JobId, JobKind, JobRecord, JobStatus, TargetRef};
use crate::locks::{LockRow, RowId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by a store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("record already exists")]
    AlreadyExists,

    #[error("row version changed concurrently")]
    VersionConflict,

    #[error("{0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of a token-checked release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The row was held under the given token and is now free.
    Released,
    /// The row was already free or is held under another token; untouched.
    NotHeld,
}

/// Storage for resource lock rows.
pub trait LockStore: Send + Sync {
    /// Fetch the row for `resource_id`; `StoreError::NotFound` if none exists.
    fn fetch_lock(&self, resource_id: &str) -> StoreResult<LockRow>;

    /// Create a row; `StoreError::AlreadyExists` if one already exists for
    /// the same resource.
    fn create_lock(&self, row: &LockRow) -> StoreResult<()>;

    /// Replace the row if its stored version still equals `expected_version`.
    /// The written row gets `expected_version + 1`, and is returned.
    fn update_lock(&self, row: &LockRow, expected_version: u64) -> StoreResult<LockRow>;

    /// Clear `is_locked` if the row identified by `lock_id` is still held
    /// under `token`.
    fn release_lock(
        &self,
        resource_id: &str,
        lock_id: &RowId,
        token: &str,
    ) -> StoreResult<ReleaseOutcome>;

    /// Clear `is_locked` regardless of holder; returns the row as it was.
    fn force_release(&self, resource_id: &str) -> StoreResult<LockRow>;

    fn list_locks(&self) -> StoreResult<Vec<LockRow>>;
}

/// Storage for job records.
pub trait JobStore: Send + Sync {
    /// Pending or in-progress jobs of `kind` whose target key is in `keys`.
    fn fetch_live_jobs(&self, kind: JobKind, keys: &[String]) -> StoreResult<Vec<JobRecord>>;

    /// Persist all jobs or none of them.
    fn create_jobs(&self, jobs: &[JobRecord]) -> StoreResult<Vec<JobId>>;

    fn fetch_job(&self, id: &JobId) -> StoreResult<JobRecord>;

    fn list_jobs(&self, kind: Option<JobKind>) -> StoreResult<Vec<JobRecord>>;

    fn set_job_status(&self, id: &JobId, status: JobStatus) -> StoreResult<JobRecord>;
}

/// A contract and the customer site it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEntry {
    pub id: String,
    pub name: String,
    pub customer_site_id: String,
}

impl ContractEntry {
    pub fn target(&self) -> TargetRef {
        TargetRef::new(self.id.clone(), self.name.clone())
    }
}

/// Read access to the business entities jobs target.
pub trait TargetDirectory: Send + Sync {
    /// `StoreError::NotFound` for an unknown statement.
    fn billing_statement(&self, id: &str) -> StoreResult<TargetRef>;

    /// Contracts of a customer site, ordered by contract id.
    fn contracts_for_customer_site(&self, customer_site_id: &str) -> StoreResult<Vec<ContractEntry>>;

    fn register_billing_statement(&self, statement: &TargetRef) -> StoreResult<()>;

    fn register_contract(&self, contract: &ContractEntry) -> StoreResult<()>;
}

/// Everything the task services need from one backing store.
pub trait Store: LockStore + JobStore + TargetDirectory {}

impl<T: LockStore + JobStore + TargetDirectory> Store for T {}

/// Whether `key` may be used as a record file name: non-empty and made of
/// ASCII letters, digits, `.`, `_` and `-`, not starting with `.`.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
