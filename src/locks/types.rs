//! Lock row definitions and information structures.

use super::metadata::LockLease;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Store-assigned identity of a lock row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl Default for RowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The persisted lock record for one resource class.
///
/// At most one row exists per `resource_id`. `is_locked` flips on every
/// acquire and release; `version` increases on every write and backs the
/// conditional update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRow {
    pub id: RowId,
    pub resource_id: String,
    pub is_locked: bool,
    pub version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<LockLease>,
}

impl LockRow {
    /// A brand-new row, already held under `lease`.
    pub fn new_held(resource_id: &str, lease: LockLease) -> Self {
        Self {
            id: RowId::new(),
            resource_id: resource_id.to_string(),
            is_locked: true,
            version: 1,
            lease: Some(lease),
        }
    }

    /// Whether a live (unexpired) holder is inside the critical section.
    pub fn is_held(&self, now: DateTime<Utc>) -> bool {
        self.is_locked && !self.lease_expired(now)
    }

    /// Locked, but the lease has run out (or was never recorded).
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_locked
            && self
                .lease
                .as_ref()
                .is_none_or(|lease| lease.is_expired(now))
    }

    /// The same row, taken over by a new lease.
    pub fn held_by(&self, lease: LockLease) -> Self {
        Self {
            is_locked: true,
            lease: Some(lease),
            ..self.clone()
        }
    }

    /// The same row, released.
    pub fn released(&self) -> Self {
        Self {
            is_locked: false,
            lease: None,
            ..self.clone()
        }
    }
}

/// Information about a lock row for listing.
#[derive(Debug, Clone)]
pub struct LockInfo {
    pub row: LockRow,

    /// Whether the row is locked with an expired lease.
    pub is_stale: bool,
}

impl LockInfo {
    pub fn from_row(row: LockRow, now: DateTime<Utc>) -> Self {
        let is_stale = row.lease_expired(now);
        Self { row, is_stale }
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.row.lease, self.row.is_locked) {
            (Some(lease), true) => write!(
                f,
                "{} (holder: {}, age: {}, action: {}{})",
                self.row.resource_id,
                lease.holder,
                lease.age_string(),
                lease.action,
                if self.is_stale { ", STALE" } else { "" }
            ),
            (None, true) => write!(f, "{} (locked, no lease, STALE)", self.row.resource_id),
            (_, false) => write!(f, "{} (free)", self.row.resource_id),
        }
    }
}
