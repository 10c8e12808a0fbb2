//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for billing-jobs.
///
/// This struct represents the contents of `.billing-jobs/config.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Minutes a lock lease lasts before it may be taken over or reaped.
    #[serde(default = "default_lock_lease_minutes")]
    pub lock_lease_minutes: u32,

    /// Seconds between background reaper scans.
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,

    /// Lock resource name per job kind.
    #[serde(default)]
    pub resource_classes: ResourceClasses,

    // =========================================================================
    // Enqueue settings
    // =========================================================================
    /// Largest number of targets accepted by one batch enqueue.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_lease_minutes: default_lock_lease_minutes(),
            reaper_interval_secs: default_reaper_interval_secs(),
            resource_classes: ResourceClasses::default(),
            max_batch_size: default_max_batch_size(),
        }
    }
}
