//! Duplicate-job guard layered on the resource locks.

use super::types::{JobId, JobKind, JobParams, JobRecord, JobStatus, TargetRef};
use crate::config::{Config, ResourceClasses};
use crate::error::{JobsError, Result};
use crate::locks::ResourceLocks;
use crate::store::Store;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Enqueues jobs so that no two live jobs of one kind share a target key.
///
/// Flow for every enqueue:
/// 1. Query live jobs for the requested keys without the lock; any hit
///    fails fast with `DuplicateJobConflict`.
/// 2. Take the kind's resource lock.
/// 3. Query again under the lock, closing the window between step 1 and
///    the write for callers racing on overlapping keys.
/// 4. Create one Pending record per target as a single batch.
/// 5. Release the lock.
pub struct DedupGuard<S: Store> {
    store: Arc<S>,
    locks: ResourceLocks<S>,
    classes: ResourceClasses,
    max_batch_size: usize,
}

impl<S: Store> Clone for DedupGuard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            locks: self.locks.clone(),
            classes: self.classes.clone(),
            max_batch_size: self.max_batch_size,
        }
    }
}

impl<S: Store> DedupGuard<S> {
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        let locks = ResourceLocks::new(Arc::clone(&store), config.lease_ttl());
        Self {
            store,
            locks,
            classes: config.resource_classes.clone(),
            max_batch_size: config.max_batch_size,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Lock resource serializing enqueues of `kind`.
    pub fn resource_for(&self, kind: JobKind) -> &str {
        self.classes.resource_for(kind)
    }

    /// Enqueue a single job for `target`.
    pub fn enqueue_one(&self, kind: JobKind, target: TargetRef, params: JobParams) -> Result<JobId> {
        self.enqueue_many(kind, vec![target], params)?
            .into_iter()
            .next()
            .ok_or_else(|| JobsError::StoreUnavailable("store returned no job id".to_string()))
    }

    /// Enqueue one job per target, all or nothing.
    ///
    /// If any target already has a live job, nothing is created and the
    /// error names every colliding target. Repeated keys within the batch
    /// collapse to their first occurrence.
    pub fn enqueue_many(
        &self,
        kind: JobKind,
        targets: Vec<TargetRef>,
        params: JobParams,
    ) -> Result<Vec<JobId>> {
        let targets = self.validate_batch(targets)?;
        let keys: Vec<String> = targets.iter().map(|t| t.key.clone()).collect();

        self.ensure_no_live_jobs(kind, &targets, &keys)?;

        let resource = self.classes.resource_for(kind);
        let action = format!("enqueue:{}", kind);
        let ids = self.locks.acquire_and_run(resource, &action, || {
            self.ensure_no_live_jobs(kind, &targets, &keys)?;

            let jobs: Vec<JobRecord> = targets
                .iter()
                .map(|target| JobRecord::pending(kind, target.clone(), params.clone()))
                .collect();
            Ok(self.store.create_jobs(&jobs)?)
        })?;

        info!(kind = %kind, count = ids.len(), "enqueued jobs");
        Ok(ids)
    }

    /// Move `job` to `status`.
    ///
    /// Moving a job into a live status takes the kind's lock and fails with
    /// `DuplicateJobConflict` when another live job already covers the same
    /// target, so a finished job cannot be revived next to its successor.
    pub fn set_status(&self, job: &JobRecord, status: JobStatus) -> Result<JobRecord> {
        if !status.is_live() {
            return Ok(self.store.set_job_status(&job.id, status)?);
        }

        let resource = self.classes.resource_for(job.kind);
        let action = format!("set-status:{}", job.id);
        self.locks.acquire_and_run(resource, &action, || {
            let keys = [job.target.key.clone()];
            let others: Vec<JobRecord> = self
                .store
                .fetch_live_jobs(job.kind, &keys)?
                .into_iter()
                .filter(|live| live.id != job.id)
                .collect();

            if let Some(live) = others.first() {
                debug!(job = %job.id, blocking = %live.id, "live job blocks status change");
                return Err(JobsError::DuplicateJobConflict {
                    targets: vec![live.target.clone()],
                });
            }
            Ok(self.store.set_job_status(&job.id, status)?)
        })
    }

    fn validate_batch(&self, targets: Vec<TargetRef>) -> Result<Vec<TargetRef>> {
        if targets.is_empty() {
            return Err(JobsError::ValidationError(
                "at least one target is required".to_string(),
            ));
        }

        if let Some(blank) = targets.iter().find(|t| t.key.trim().is_empty()) {
            return Err(JobsError::ValidationError(format!(
                "target '{}' has an empty key",
                blank.name
            )));
        }

        let mut seen = HashSet::new();
        let unique: Vec<TargetRef> = targets
            .into_iter()
            .filter(|t| seen.insert(t.key.clone()))
            .collect();

        if unique.len() > self.max_batch_size {
            return Err(JobsError::ValidationError(format!(
                "{} targets requested; at most {} may be enqueued at once",
                unique.len(),
                self.max_batch_size
            )));
        }

        Ok(unique)
    }

    fn ensure_no_live_jobs(&self, kind: JobKind, targets: &[TargetRef], keys: &[String]) -> Result<()> {
        let live = self.store.fetch_live_jobs(kind, keys)?;
        if live.is_empty() {
            return Ok(());
        }

        let offending: Vec<TargetRef> = targets
            .iter()
            .filter_map(|target| {
                live.iter()
                    .find(|job| job.target.key == target.key)
                    .map(|job| job.target.clone())
            })
            .collect();

        debug!(kind = %kind, conflicts = offending.len(), "live jobs block enqueue");
        Err(JobsError::DuplicateJobConflict { targets: offending })
    }
}
