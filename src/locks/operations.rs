//! Lock acquisition and administrative operations.

use super::guard::LockGuard;
use super::metadata::LockLease;
use super::types::{LockInfo, LockRow};
use crate::error::{JobsError, Result};
use crate::store::{LockStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Named, store-backed mutual exclusion.
///
/// One attempt per call: there is no waiting, queueing, or retry. A caller
/// that loses simply gets `JobsError::LockUnavailable`.
pub struct ResourceLocks<S: LockStore> {
    store: Arc<S>,
    lease_ttl: Duration,
}

impl<S: LockStore> Clone for ResourceLocks<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lease_ttl: self.lease_ttl,
        }
    }
}

impl<S: LockStore> ResourceLocks<S> {
    pub fn new(store: Arc<S>, lease_ttl: Duration) -> Self {
        Self { store, lease_ttl }
    }

    /// Try once to take the lock for `resource_id`.
    ///
    /// - Existing free row (or one whose lease expired): conditional update
    ///   on the row version.
    /// - No row: exclusive create; losing the creation race means the lock
    ///   is unavailable.
    /// - Held row, lost race, or any store failure: `LockUnavailable`.
    pub fn acquire(&self, resource_id: &str, action: &str) -> Result<LockGuard<S>> {
        let now = Utc::now();
        let lease = LockLease::new(action, now, self.lease_ttl);
        let token = lease.token.clone();

        let row = match self.store.fetch_lock(resource_id) {
            Ok(current) => self.take_over(current, lease, now)?,
            Err(StoreError::NotFound) => {
                debug!(resource = resource_id, "no lock row yet; creating one");
                self.create(resource_id, lease)?
            }
            Err(e) => {
                warn!(resource = resource_id, error = %e, "could not read lock row");
                return Err(unavailable(resource_id, format!("store error: {}", e)));
            }
        };

        info!(resource = resource_id, lock_id = %row.id, action, "acquired lock");
        Ok(LockGuard::new(
            Arc::clone(&self.store),
            resource_id.to_string(),
            row.id,
            token,
        ))
    }

    /// Run `action` while holding the lock for `resource_id`.
    ///
    /// `action` is not invoked when the lock cannot be taken. The lock is
    /// released whether `action` succeeds, fails, or panics; a release
    /// failure is logged and does not replace the action's result.
    pub fn acquire_and_run<T, F>(&self, resource_id: &str, action_name: &str, action: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let guard = self.acquire(resource_id, action_name)?;
        debug!(
            resource = resource_id,
            lock_id = %guard.lock_id(),
            token = guard.token(),
            action = action_name,
            "running action under lock"
        );
        let result = action();
        if let Err(e) = guard.release() {
            warn!(
                resource = resource_id,
                error = %e,
                "release failed; the lock will be recovered when its lease expires"
            );
        }
        result
    }

    /// All lock rows, annotated with staleness.
    pub fn list(&self) -> Result<Vec<LockInfo>> {
        let now = Utc::now();
        let rows = self.store.list_locks()?;
        Ok(rows
            .into_iter()
            .map(|row| LockInfo::from_row(row, now))
            .collect())
    }

    /// Force-release a lock regardless of who holds it.
    ///
    /// The caller is responsible for deciding that clearing is appropriate.
    pub fn clear(&self, resource_id: &str) -> Result<LockInfo> {
        let now = Utc::now();
        match self.store.force_release(resource_id) {
            Ok(previous) => {
                warn!(resource = resource_id, "lock force-released");
                Ok(LockInfo::from_row(previous, now))
            }
            Err(StoreError::NotFound) => Err(JobsError::UserError(format!(
                "lock '{}' does not exist",
                resource_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn take_over(&self, current: LockRow, lease: LockLease, now: DateTime<Utc>) -> Result<LockRow> {
        if current.is_held(now) {
            let holder = current
                .lease
                .as_ref()
                .map(|l| format!("held by {} for {} ({})", l.holder, l.action, l.age_string()))
                .unwrap_or_else(|| "held".to_string());
            return Err(unavailable(&current.resource_id, holder));
        }

        if current.lease_expired(now) {
            warn!(
                resource = %current.resource_id,
                holder = current.lease.as_ref().map(|l| l.holder.as_str()).unwrap_or("unknown"),
                "taking over lock with expired lease"
            );
        }

        let expected_version = current.version;
        match self
            .store
            .update_lock(&current.held_by(lease), expected_version)
        {
            Ok(row) => Ok(row),
            Err(StoreError::VersionConflict) | Err(StoreError::NotFound) => {
                warn!(resource = %current.resource_id, "lost race for lock");
                Err(unavailable(
                    &current.resource_id,
                    "acquired concurrently by another caller".to_string(),
                ))
            }
            Err(e) => {
                warn!(resource = %current.resource_id, error = %e, "could not update lock row");
                Err(unavailable(&current.resource_id, format!("store error: {}", e)))
            }
        }
    }

    fn create(&self, resource_id: &str, lease: LockLease) -> Result<LockRow> {
        let row = LockRow::new_held(resource_id, lease);
        match self.store.create_lock(&row) {
            Ok(()) => Ok(row),
            Err(StoreError::AlreadyExists) => {
                warn!(resource = resource_id, "lock row created concurrently by another caller");
                Err(unavailable(
                    resource_id,
                    "acquired concurrently by another caller".to_string(),
                ))
            }
            Err(e) => {
                warn!(resource = resource_id, error = %e, "could not create lock row");
                Err(unavailable(resource_id, format!("store error: {}", e)))
            }
        }
    }
}

fn unavailable(resource_id: &str, reason: String) -> JobsError {
    JobsError::LockUnavailable {
        resource: resource_id.to_string(),
        reason,
    }
}
