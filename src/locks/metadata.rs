//! Lease metadata carried by a held lock row.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Lease stamped onto a lock row while it is held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockLease {
    /// Unique per acquisition; release only succeeds with the matching token.
    pub token: String,

    /// Holder of the lock (e.g., `user@HOST`).
    pub holder: String,

    /// Process ID of the holder (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// The guarded action (e.g., `enqueue:email`).
    pub action: String,

    pub acquired_at: DateTime<Utc>,

    /// After this instant the lease may be taken over or reaped.
    pub expires_at: DateTime<Utc>,
}

impl LockLease {
    /// Create a new lease starting at `now` that lasts `ttl`.
    pub fn new(action: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            token: Ulid::new().to_string(),
            holder: get_owner_string(),
            pid: Some(std::process::id()),
            action: action.to_string(),
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Calculate the age of the lease.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.acquired_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let minutes = age.num_minutes();
        let hours = age.num_hours();
        let days = age.num_days();

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else {
            format!("{}m", minutes)
        }
    }
}

/// Get the owner string for lease metadata.
pub(crate) fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
