//! Job record types shared by every job kind.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// The kind of background job. Each kind has its own lock resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Billing-statement email generation (target: billing statement id).
    Email,
    /// Billing-statement generation (target: contract id).
    Statement,
    /// Unit-account batch (target: service period `YYYY-MM`).
    UnitAccount,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Email, JobKind::Statement, JobKind::UnitAccount];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Email => "email",
            JobKind::Statement => "statement",
            JobKind::UnitAccount => "unit_account",
        }
    }

    /// Parse a job kind; accepts `unit-account` as well as `unit_account`.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Some(Self::Email),
            "statement" => Some(Self::Statement),
            "unit_account" | "unit-account" => Some(Self::UnitAccount),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a job record.
///
/// State transitions (driven by the external worker):
/// - Pending -> InProgress -> Completed
/// - Pending -> InProgress -> Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// Live jobs block new jobs for the same target.
    pub fn is_live(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "in-progress" | "inprogress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who requested a statement job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    #[default]
    Manual,
    System,
}

/// What an email job does with the rendered statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SendAction {
    /// Email the customer and send to GP.
    #[default]
    SendAll,
    /// Email the customer only.
    SendEmail,
    /// Send to GP only.
    #[serde(rename = "SendToGP")]
    SendToGp,
}

impl SendAction {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "sendall" | "all" => Some(Self::SendAll),
            "sendemail" | "email" => Some(Self::SendEmail),
            "sendtogp" | "gp" => Some(Self::SendToGp),
            _ => None,
        }
    }
}

/// Store-assigned identifier of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Ulid);

impl JobId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// A business target a job operates on: its dedup key plus a display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub key: String,
    pub name: String,
}

impl TargetRef {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }

    /// A target whose display name is its key (e.g. a service period).
    pub fn keyed(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
        }
    }
}

/// Optional parameters stamped onto every job of one enqueue call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<JobSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_action: Option<SendAction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_period_start: Option<NaiveDate>,
}

/// A persisted background job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    pub target: TargetRef,
    pub status: JobStatus,

    #[serde(flatten)]
    pub params: JobParams,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Build a fresh Pending job.
    pub fn pending(kind: JobKind, target: TargetRef, params: JobParams) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            target,
            status: JobStatus::Pending,
            params,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}
