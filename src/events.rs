//! Audit event log for billing-jobs.
//!
//! Events are appended to `events/events.ndjson` under the data directory,
//! one JSON object per line:
//! - `ts`: RFC3339 timestamp
//! - `action`: what happened (init, enqueue, job_status, ...)
//! - `actor`: the owner string (e.g., `user@HOST`)
//! - `target`: optional job kind, job id or lock resource the event is about
//! - `details`: freeform object with action-specific details
//!
//! The log is written after the state change it records succeeds; a failed
//! enqueue leaves no event behind.

use crate::context::AppContext;
use crate::error::{JobsError, Result};
use crate::locks::get_owner_string;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Data directory initialized
    Init,
    /// Jobs enqueued
    Enqueue,
    /// Job status changed by an operator
    JobStatus,
    /// Lock cleared manually
    LockClear,
    /// Expired locks released by the reaper
    LockReap,
    /// Billing statement or contract registered
    Register,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventAction::Init => "init",
            EventAction::Enqueue => "enqueue",
            EventAction::JobStatus => "job_status",
            EventAction::LockClear => "lock_clear",
            EventAction::LockReap => "lock_reap",
            EventAction::Register => "register",
        };
        f.write_str(name)
    }
}

/// An event record for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,

    pub action: EventAction,

    /// Who performed the action (e.g., `user@HOST`).
    pub actor: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    pub details: Value,
}

impl Event {
    /// Create a new event stamped with the current time and actor.
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: get_owner_string(),
            target: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| JobsError::UserError(format!("failed to serialize event to JSON: {}", e)))
    }
}

/// Get the path to the events file.
pub fn events_file_path(ctx: &AppContext) -> PathBuf {
    ctx.events_dir.join("events.ndjson")
}

/// Append an event to the events log, creating the file if needed.
pub fn append_event(ctx: &AppContext, event: &Event) -> Result<()> {
    let events_file = events_file_path(ctx);
    let json_line = event.to_ndjson_line()?;

    fs::create_dir_all(&ctx.events_dir).map_err(|e| {
        JobsError::UserError(format!(
            "failed to create events directory '{}': {}",
            ctx.events_dir.display(),
            e
        ))
    })?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&events_file)
        .map_err(|e| {
            JobsError::UserError(format!(
                "failed to open events file '{}': {}",
                events_file.display(),
                e
            ))
        })?;

    writeln!(file, "{}", json_line).map_err(|e| {
        JobsError::UserError(format!(
            "failed to write event to '{}': {}",
            events_file.display(),
            e
        ))
    })?;

    file.sync_all().map_err(|e| {
        JobsError::UserError(format!(
            "failed to sync events file '{}': {}",
            events_file.display(),
            e
        ))
    })
}

/// Read every event in the log, oldest first. A missing log is empty.
pub fn read_events(ctx: &AppContext) -> Result<Vec<Event>> {
    let events_file = events_file_path(ctx);
    let content = match fs::read_to_string(&events_file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(JobsError::UserError(format!(
                "failed to read events file '{}': {}",
                events_file.display(),
                e
            )));
        }
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| {
                JobsError::UserError(format!(
                    "malformed event in '{}': {}",
                    events_file.display(),
                    e
                ))
            })
        })
        .collect()
}
