//! RAII lock guard implementation.

use crate::error::{JobsError, Result};
use crate::store::{LockStore, ReleaseOutcome};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::RowId;

/// RAII guard for a held resource lock.
///
/// When dropped, the lock row is released. A failed release is logged and
/// never panics; the lease expiry (and the reaper) recover the row later.
pub struct LockGuard<S: LockStore> {
    store: Arc<S>,
    resource_id: String,
    lock_id: RowId,
    token: String,
    released: bool,
}

impl<S: LockStore> LockGuard<S> {
    pub(super) fn new(store: Arc<S>, resource_id: String, lock_id: RowId, token: String) -> Self {
        Self {
            store,
            resource_id,
            lock_id,
            token,
            released: false,
        }
    }

    pub fn lock_id(&self) -> &RowId {
        &self.lock_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Release now and report store failures to the caller.
    pub fn release(mut self) -> Result<ReleaseOutcome> {
        self.released = true;
        let outcome = self
            .store
            .release_lock(&self.resource_id, &self.lock_id, &self.token)
            .map_err(|e| {
                JobsError::StoreUnavailable(format!(
                    "failed to release lock '{}': {}",
                    self.resource_id, e
                ))
            })?;
        self.log_outcome(outcome);
        Ok(outcome)
    }

    fn log_outcome(&self, outcome: ReleaseOutcome) {
        match outcome {
            ReleaseOutcome::Released => {
                info!(resource = %self.resource_id, lock_id = %self.lock_id, "released lock");
            }
            ReleaseOutcome::NotHeld => {
                debug!(
                    resource = %self.resource_id,
                    "lock was no longer held by this lease at release"
                );
            }
        }
    }
}

impl<S: LockStore> Drop for LockGuard<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self
            .store
            .release_lock(&self.resource_id, &self.lock_id, &self.token)
        {
            Ok(outcome) => self.log_outcome(outcome),
            Err(e) => warn!(
                resource = %self.resource_id,
                lock_id = %self.lock_id,
                error = %e,
                "failed to release lock on drop; it will be recovered when its lease expires"
            ),
        }
    }
}

impl<S: LockStore> std::fmt::Debug for LockGuard<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("resource_id", &self.resource_id)
            .field("lock_id", &self.lock_id)
            .field("released", &self.released)
            .finish()
    }
}
