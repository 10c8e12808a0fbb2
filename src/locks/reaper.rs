//! Recovery of locks whose holder never released them.

use super::types::LockRow;
use crate::error::Result;
use crate::store::{LockStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A lock the reaper released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapedLock {
    pub resource_id: String,
    pub holder: Option<String>,
    pub action: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl ReapedLock {
    fn from_row(row: &LockRow) -> Self {
        Self {
            resource_id: row.resource_id.clone(),
            holder: row.lease.as_ref().map(|l| l.holder.clone()),
            action: row.lease.as_ref().map(|l| l.action.clone()),
            expired_at: row.lease.as_ref().map(|l| l.expires_at),
        }
    }
}

/// Release every lock whose lease expired before `now`.
///
/// Each release is conditional on the row version seen by the scan, so a
/// lock taken over between the scan and the release is left alone.
pub fn reap_expired<S: LockStore + ?Sized>(store: &S, now: DateTime<Utc>) -> Result<Vec<ReapedLock>> {
    let mut reaped = Vec::new();

    for row in store.list_locks()? {
        if !row.lease_expired(now) {
            continue;
        }

        match store.update_lock(&row.released(), row.version) {
            Ok(_) => {
                info!(resource = %row.resource_id, "reaped expired lock");
                reaped.push(ReapedLock::from_row(&row));
            }
            Err(StoreError::VersionConflict) | Err(StoreError::NotFound) => {
                debug!(resource = %row.resource_id, "expired lock changed before reaping; skipped");
            }
            Err(e) => {
                warn!(resource = %row.resource_id, error = %e, "failed to reap expired lock");
            }
        }
    }

    Ok(reaped)
}

/// Background thread that periodically reaps expired locks.
///
/// Stops when `stop` is called or the handle is dropped.
pub struct Reaper {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Spawn the reaper. `on_reap` is called with every non-empty batch.
    pub fn spawn<S, F>(store: Arc<S>, interval: Duration, mut on_reap: F) -> Self
    where
        S: LockStore + 'static,
        F: FnMut(&[ReapedLock]) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                match reap_expired(store.as_ref(), Utc::now()) {
                    Ok(reaped) if !reaped.is_empty() => on_reap(&reaped),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "reaper scan failed"),
                }

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("reaper stopped");
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Signal the thread to stop and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Block until the reaper thread exits (it only exits once stopped).
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("reaper thread panicked");
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
