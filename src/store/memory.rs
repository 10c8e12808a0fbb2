//! In-process store for tests.
//!
//! All state lives behind one mutex, so each trait call is atomic. Failures
//! can be injected per operation to exercise error paths.

use super::{
    ContractEntry, JobStore, LockStore, ReleaseOutcome, StoreError, StoreResult, TargetDirectory,
};
use crate::jobs::{JobId, JobKind, JobRecord, JobStatus, TargetRef};
use crate::locks::{LockRow, RowId};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    FetchLock,
    CreateLock,
    UpdateLock,
    ReleaseLock,
    FetchLiveJobs,
    CreateJobs,
}

type Hook = Box<dyn FnMut(&mut MemoryState) + Send>;

#[derive(Default)]
pub struct MemoryState {
    pub locks: BTreeMap<String, LockRow>,
    pub jobs: BTreeMap<JobId, JobRecord>,
    pub statements: BTreeMap<String, TargetRef>,
    pub contracts: BTreeMap<String, ContractEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failures: Mutex<HashMap<StoreOp, usize>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
    after_live_query: Mutex<Option<Hook>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` fail with `StoreError::Unavailable`.
    pub fn fail_next(&self, op: StoreOp, times: usize) {
        *self.failures.lock().unwrap().entry(op).or_default() += times;
    }

    /// Number of times `op` has been called.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    /// Run `hook` against the state once, right after the next live-job query
    /// returns. Simulates a competing writer landing between two reads.
    pub fn after_next_live_query(&self, hook: impl FnMut(&mut MemoryState) + Send + 'static) {
        *self.after_live_query.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        f(&mut *self.state())
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn enter(&self, op: StoreOp) -> StoreResult<()> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;

        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(StoreError::Unavailable(format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

impl LockStore for MemoryStore {
    fn fetch_lock(&self, resource_id: &str) -> StoreResult<LockRow> {
        self.enter(StoreOp::FetchLock)?;
        self.state()
            .locks
            .get(resource_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn create_lock(&self, row: &LockRow) -> StoreResult<()> {
        self.enter(StoreOp::CreateLock)?;
        let mut state = self.state();
        if state.locks.contains_key(&row.resource_id) {
            return Err(StoreError::AlreadyExists);
        }
        state.locks.insert(row.resource_id.clone(), row.clone());
        Ok(())
    }

    fn update_lock(&self, row: &LockRow, expected_version: u64) -> StoreResult<LockRow> {
        self.enter(StoreOp::UpdateLock)?;
        let mut state = self.state();
        let current = state
            .locks
            .get_mut(&row.resource_id)
            .ok_or(StoreError::NotFound)?;
        if current.id != row.id || current.version != expected_version {
            return Err(StoreError::VersionConflict);
        }
        *current = LockRow {
            version: expected_version + 1,
            ..row.clone()
        };
        Ok(current.clone())
    }

    fn release_lock(
        &self,
        resource_id: &str,
        lock_id: &RowId,
        token: &str,
    ) -> StoreResult<ReleaseOutcome> {
        self.enter(StoreOp::ReleaseLock)?;
        let mut state = self.state();
        let current = state.locks.get_mut(resource_id).ok_or(StoreError::NotFound)?;
        let held_by_token = current.is_locked
            && current.id == *lock_id
            && current.lease.as_ref().is_some_and(|l| l.token == token);
        if !held_by_token {
            return Ok(ReleaseOutcome::NotHeld);
        }
        let version = current.version + 1;
        *current = LockRow {
            version,
            ..current.released()
        };
        Ok(ReleaseOutcome::Released)
    }

    fn force_release(&self, resource_id: &str) -> StoreResult<LockRow> {
        let mut state = self.state();
        let current = state.locks.get_mut(resource_id).ok_or(StoreError::NotFound)?;
        let previous = current.clone();
        *current = LockRow {
            version: previous.version + 1,
            ..previous.released()
        };
        Ok(previous)
    }

    fn list_locks(&self) -> StoreResult<Vec<LockRow>> {
        Ok(self.state().locks.values().cloned().collect())
    }
}

impl JobStore for MemoryStore {
    fn fetch_live_jobs(&self, kind: JobKind, keys: &[String]) -> StoreResult<Vec<JobRecord>> {
        self.enter(StoreOp::FetchLiveJobs)?;
        let mut state = self.state();
        let live: Vec<JobRecord> = state
            .jobs
            .values()
            .filter(|job| job.kind == kind && job.is_live())
            .filter(|job| keys.iter().any(|k| *k == job.target.key))
            .cloned()
            .collect();

        if let Some(mut hook) = self.after_live_query.lock().unwrap().take() {
            hook(&mut *state);
        }
        Ok(live)
    }

    fn create_jobs(&self, jobs: &[JobRecord]) -> StoreResult<Vec<JobId>> {
        self.enter(StoreOp::CreateJobs)?;
        let mut state = self.state();
        for job in jobs {
            state.jobs.insert(job.id, job.clone());
        }
        Ok(jobs.iter().map(|job| job.id).collect())
    }

    fn fetch_job(&self, id: &JobId) -> StoreResult<JobRecord> {
        self.state().jobs.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn list_jobs(&self, kind: Option<JobKind>) -> StoreResult<Vec<JobRecord>> {
        Ok(self
            .state()
            .jobs
            .values()
            .filter(|job| kind.is_none_or(|k| job.kind == k))
            .cloned()
            .collect())
    }

    fn set_job_status(&self, id: &JobId, status: JobStatus) -> StoreResult<JobRecord> {
        let mut state = self.state();
        let job = state.jobs.get_mut(id).ok_or(StoreError::NotFound)?;
        job.status = status;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}

impl TargetDirectory for MemoryStore {
    fn billing_statement(&self, id: &str) -> StoreResult<TargetRef> {
        self.state()
            .statements
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn contracts_for_customer_site(&self, customer_site_id: &str) -> StoreResult<Vec<ContractEntry>> {
        Ok(self
            .state()
            .contracts
            .values()
            .filter(|c| c.customer_site_id == customer_site_id)
            .cloned()
            .collect())
    }

    fn register_billing_statement(&self, statement: &TargetRef) -> StoreResult<()> {
        self.state()
            .statements
            .insert(statement.key.clone(), statement.clone());
        Ok(())
    }

    fn register_contract(&self, contract: &ContractEntry) -> StoreResult<()> {
        self.state()
            .contracts
            .insert(contract.id.clone(), contract.clone());
        Ok(())
    }
}
