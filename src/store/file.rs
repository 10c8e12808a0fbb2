//! Directory-backed store.
//!
//! Layout under the store root:
//!
//! ```text
//! locks/{resource_id}.json
//! jobs/{kind}/{job_id}.json
//! directory/billing_statements/{id}.json
//! directory/contracts/{id}.json
//! ```
//!
//! Read-modify-write of a single row happens under a guard file
//! (`.{name}.guard`, created with create_new semantics) so that the version
//! compare and the write are one step for every process sharing the
//! directory. A guard left by a crashed writer is only removed by whoever
//! holds `.{name}.guard.break`.

use super::{
    ContractEntry, JobStore, LockStore, ReleaseOutcome, StoreError, StoreResult, TargetDirectory,
    is_safe_key,
};
use crate::fs::{atomic_create_new, atomic_write};
use crate::jobs::{JobId, JobKind, JobRecord, JobStatus, TargetRef};
use crate::locks::{LockRow, RowId};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to try for a row guard before giving up.
const GUARD_ATTEMPTS: u32 = 200;

/// Pause between guard attempts.
const GUARD_BACKOFF: Duration = Duration::from_millis(5);

/// A guard file older than this belongs to a crashed writer.
const GUARD_STALE_AFTER: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (or lazily create) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    fn jobs_dir(&self, kind: JobKind) -> PathBuf {
        self.root.join("jobs").join(kind.as_str())
    }

    fn statements_dir(&self) -> PathBuf {
        self.root.join("directory").join("billing_statements")
    }

    fn contracts_dir(&self) -> PathBuf {
        self.root.join("directory").join("contracts")
    }

    fn lock_path(&self, resource_id: &str) -> StoreResult<PathBuf> {
        record_path(&self.locks_dir(), resource_id)
    }

    fn job_path(&self, kind: JobKind, id: &JobId) -> PathBuf {
        self.jobs_dir(kind).join(format!("{}.json", id))
    }

    /// Locate a job without knowing its kind.
    fn find_job_path(&self, id: &JobId) -> StoreResult<PathBuf> {
        JobKind::ALL
            .iter()
            .map(|kind| self.job_path(*kind, id))
            .find(|path| path.exists())
            .ok_or(StoreError::NotFound)
    }
}

impl LockStore for FileStore {
    fn fetch_lock(&self, resource_id: &str) -> StoreResult<LockRow> {
        read_record(&self.lock_path(resource_id)?)
    }

    fn create_lock(&self, row: &LockRow) -> StoreResult<()> {
        let path = self.lock_path(&row.resource_id)?;
        atomic_create_new(&path, &to_json(row)?)
    }

    fn update_lock(&self, row: &LockRow, expected_version: u64) -> StoreResult<LockRow> {
        let path = self.lock_path(&row.resource_id)?;
        let _guard = RowGuard::acquire(&path)?;

        let current: LockRow = read_record(&path)?;
        if current.id != row.id || current.version != expected_version {
            return Err(StoreError::VersionConflict);
        }

        let next = LockRow {
            version: expected_version + 1,
            ..row.clone()
        };
        atomic_write(&path, &to_json(&next)?)?;
        Ok(next)
    }

    fn release_lock(
        &self,
        resource_id: &str,
        lock_id: &RowId,
        token: &str,
    ) -> StoreResult<ReleaseOutcome> {
        let path = self.lock_path(resource_id)?;
        let _guard = RowGuard::acquire(&path)?;

        let current: LockRow = read_record(&path)?;
        let held_by_token = current.is_locked
            && current.id == *lock_id
            && current.lease.as_ref().is_some_and(|l| l.token == token);
        if !held_by_token {
            return Ok(ReleaseOutcome::NotHeld);
        }

        let mut next = current.released();
        next.version = current.version + 1;
        atomic_write(&path, &to_json(&next)?)?;
        Ok(ReleaseOutcome::Released)
    }

    fn force_release(&self, resource_id: &str) -> StoreResult<LockRow> {
        let path = self.lock_path(resource_id)?;
        let _guard = RowGuard::acquire(&path)?;

        let current: LockRow = read_record(&path)?;
        let mut next = current.released();
        next.version = current.version + 1;
        atomic_write(&path, &to_json(&next)?)?;
        Ok(current)
    }

    fn list_locks(&self) -> StoreResult<Vec<LockRow>> {
        let mut rows: Vec<LockRow> = read_all(&self.locks_dir())?;
        rows.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        Ok(rows)
    }
}

impl JobStore for FileStore {
    fn fetch_live_jobs(&self, kind: JobKind, keys: &[String]) -> StoreResult<Vec<JobRecord>> {
        let jobs: Vec<JobRecord> = read_all(&self.jobs_dir(kind))?;
        Ok(jobs
            .into_iter()
            .filter(|job| job.is_live() && keys.iter().any(|k| *k == job.target.key))
            .collect())
    }

    fn create_jobs(&self, jobs: &[JobRecord]) -> StoreResult<Vec<JobId>> {
        let mut written: Vec<PathBuf> = Vec::with_capacity(jobs.len());

        for job in jobs {
            let path = self.job_path(job.kind, &job.id);
            let result = to_json(job).and_then(|bytes| atomic_create_new(&path, &bytes));
            if let Err(e) = result {
                for path in &written {
                    if let Err(cleanup) = fs::remove_file(path) {
                        warn!(path = %path.display(), error = %cleanup, "failed to roll back job record");
                    }
                }
                return Err(StoreError::Unavailable(format!(
                    "failed to create job batch ({} of {} written, rolled back): {}",
                    written.len(),
                    jobs.len(),
                    e
                )));
            }
            written.push(path);
        }

        debug!(count = jobs.len(), "created job records");
        Ok(jobs.iter().map(|job| job.id).collect())
    }

    fn fetch_job(&self, id: &JobId) -> StoreResult<JobRecord> {
        read_record(&self.find_job_path(id)?)
    }

    fn list_jobs(&self, kind: Option<JobKind>) -> StoreResult<Vec<JobRecord>> {
        let kinds: Vec<JobKind> = match kind {
            Some(kind) => vec![kind],
            None => JobKind::ALL.to_vec(),
        };

        let mut jobs = Vec::new();
        for kind in kinds {
            jobs.extend(read_all::<JobRecord>(&self.jobs_dir(kind))?);
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    fn set_job_status(&self, id: &JobId, status: JobStatus) -> StoreResult<JobRecord> {
        let path = self.find_job_path(id)?;
        let _guard = RowGuard::acquire(&path)?;

        let mut job: JobRecord = read_record(&path)?;
        job.status = status;
        job.updated_at = Utc::now();
        atomic_write(&path, &to_json(&job)?)?;
        Ok(job)
    }
}

impl TargetDirectory for FileStore {
    fn billing_statement(&self, id: &str) -> StoreResult<TargetRef> {
        read_record(&record_path(&self.statements_dir(), id)?)
    }

    fn contracts_for_customer_site(&self, customer_site_id: &str) -> StoreResult<Vec<ContractEntry>> {
        let mut contracts: Vec<ContractEntry> = read_all(&self.contracts_dir())?;
        contracts.retain(|c| c.customer_site_id == customer_site_id);
        contracts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(contracts)
    }

    fn register_billing_statement(&self, statement: &TargetRef) -> StoreResult<()> {
        let path = record_path(&self.statements_dir(), &statement.key)?;
        atomic_write(&path, &to_json(statement)?)
    }

    fn register_contract(&self, contract: &ContractEntry) -> StoreResult<()> {
        let path = record_path(&self.contracts_dir(), &contract.id)?;
        atomic_write(&path, &to_json(contract)?)
    }
}

/// Exclusive guard file next to a row. Removed on drop.
struct RowGuard {
    path: PathBuf,
}

impl RowGuard {
    fn acquire(row_path: &Path) -> StoreResult<Self> {
        let guard_path = guard_path(row_path)?;
        if let Some(parent) = guard_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!(
                    "failed to create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        for _ in 0..GUARD_ATTEMPTS {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&guard_path)
            {
                Ok(_) => return Ok(Self { path: guard_path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if guard_is_stale(&guard_path) && break_stale_guard(&guard_path)? {
                        continue;
                    }
                    thread::sleep(GUARD_BACKOFF);
                }
                Err(e) => {
                    return Err(StoreError::Unavailable(format!(
                        "failed to create row guard '{}': {}",
                        guard_path.display(),
                        e
                    )));
                }
            }
        }

        let breaker = breaker_path(&guard_path);
        if guard_is_stale(&breaker) {
            return Err(StoreError::Unavailable(format!(
                "row '{}' stayed busy; remove '{}' if no other billing-jobs process is running",
                row_path.display(),
                breaker.display()
            )));
        }
        Err(StoreError::Unavailable(format!(
            "row '{}' stayed busy",
            row_path.display()
        )))
    }
}

/// Remove a guard left behind by a crashed writer.
///
/// Removal happens only while holding the `.break` file next to the guard,
/// and staleness is checked again under it: a guard that was replaced by a
/// live writer after the caller's first check is left alone. Returns whether
/// the guard is gone.
pub(super) fn break_stale_guard(guard_path: &Path) -> StoreResult<bool> {
    let breaker = breaker_path(guard_path);
    match OpenOptions::new().write(true).create_new(true).open(&breaker) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(StoreError::Unavailable(format!(
                "failed to create '{}': {}",
                breaker.display(),
                e
            )));
        }
    }
    let _breaker = RowGuard { path: breaker };

    if !guard_is_stale(guard_path) {
        return Ok(!guard_path.exists());
    }

    warn!(path = %guard_path.display(), "removing stale row guard");
    match fs::remove_file(guard_path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(StoreError::Unavailable(format!(
            "failed to remove stale row guard '{}': {}",
            guard_path.display(),
            e
        ))),
    }
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove row guard");
        }
    }
}

fn guard_path(row_path: &Path) -> StoreResult<PathBuf> {
    let parent = row_path.parent().unwrap_or(Path::new("."));
    let name = row_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::Unavailable("invalid row path".to_string()))?;
    Ok(parent.join(format!(".{}.guard", name)))
}

fn breaker_path(guard_path: &Path) -> PathBuf {
    let mut name = guard_path.as_os_str().to_owned();
    name.push(".break");
    PathBuf::from(name)
}

fn guard_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > GUARD_STALE_AFTER)
}

fn record_path(dir: &Path, key: &str) -> StoreResult<PathBuf> {
    if !is_safe_key(key) {
        return Err(StoreError::Unavailable(format!(
            "'{}' is not a valid record key",
            key
        )));
    }
    Ok(dir.join(format!("{}.json", key)))
}

fn to_json<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::Unavailable(format!("failed to serialize record: {}", e)))
}

fn read_record<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound),
        Err(e) => {
            return Err(StoreError::Unavailable(format!(
                "failed to read '{}': {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_slice(&content)
        .map_err(|e| StoreError::Corrupt(format!("'{}': {}", path.display(), e)))
}

/// Read every `*.json` record in `dir`, skipping dot-files (temporaries and
/// guards). A missing directory is an empty set.
fn read_all<T: DeserializeOwned>(dir: &Path) -> StoreResult<Vec<T>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(StoreError::Unavailable(format!(
                "failed to read directory '{}': {}",
                dir.display(),
                e
            )));
        }
    };

    let mut records = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            StoreError::Unavailable(format!("failed to read directory entry: {}", e))
        })?;
        let path = entry.path();

        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_none_or(|n| n.starts_with('.'));
        if hidden || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        match read_record(&path) {
            Ok(record) => records.push(record),
            // Deleted between listing and reading (rolled-back batch).
            Err(StoreError::NotFound) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(records)
}
