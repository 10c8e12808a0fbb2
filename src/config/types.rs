//! Configuration types and defaults for billing-jobs.

use crate::jobs::JobKind;
use serde::{Deserialize, Serialize};

/// Which lock resource serializes enqueueing for each job kind.
///
/// One lock per job kind: every email enqueue shares one lock regardless of
/// the statements it targets, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceClasses {
    #[serde(default = "default_email_resource")]
    pub email: String,

    #[serde(default = "default_statement_resource")]
    pub statement: String,

    #[serde(default = "default_unit_account_resource")]
    pub unit_account: String,
}

impl ResourceClasses {
    /// The lock resource name for `kind`.
    pub fn resource_for(&self, kind: JobKind) -> &str {
        match kind {
            JobKind::Email => &self.email,
            JobKind::Statement => &self.statement,
            JobKind::UnitAccount => &self.unit_account,
        }
    }

    /// Every (kind, resource) pair.
    pub fn entries(&self) -> impl Iterator<Item = (JobKind, &str)> {
        JobKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.resource_for(kind)))
    }
}

impl Default for ResourceClasses {
    fn default() -> Self {
        Self {
            email: default_email_resource(),
            statement: default_statement_resource(),
            unit_account: default_unit_account_resource(),
        }
    }
}

// Default value functions for serde
pub(crate) fn default_email_resource() -> String {
    "email-generation-process".to_string()
}
pub(crate) fn default_statement_resource() -> String {
    "statement-generation-process".to_string()
}
pub(crate) fn default_unit_account_resource() -> String {
    "unit-account-batch-process".to_string()
}
pub(crate) fn default_lock_lease_minutes() -> u32 {
    30
}
pub(crate) fn default_reaper_interval_secs() -> u64 {
    60
}
pub(crate) fn default_max_batch_size() -> usize {
    500
}
