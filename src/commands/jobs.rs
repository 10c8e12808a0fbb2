//! `billing-jobs jobs`: list jobs and move them between statuses.

use crate::cli::{JobsListArgs, JobsSetStatusArgs};
use crate::context::AppContext;
use crate::error::{JobsError, Result};
use crate::events::{Event, EventAction, append_event};
use crate::jobs::{DedupGuard, JobId, JobKind, JobRecord, JobStatus};
use crate::store::{JobStore, StoreError};
use serde_json::json;

pub fn cmd_jobs_list(ctx: &AppContext, args: JobsListArgs) -> Result<()> {
    let kind = args.kind.as_deref().map(parse_kind).transpose()?;
    let store = ctx.open_store();

    let jobs: Vec<JobRecord> = store
        .list_jobs(kind)?
        .into_iter()
        .filter(|job| !args.live || job.is_live())
        .collect();

    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }

    for job in &jobs {
        println!(
            "{}  {:<12} {:<11} {:<20} {}",
            job.id,
            job.kind.as_str(),
            job.status.as_str(),
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.target.name
        );
    }
    println!();
    println!("{} job(s)", jobs.len());

    Ok(())
}

pub fn cmd_jobs_set_status(ctx: &AppContext, args: JobsSetStatusArgs) -> Result<()> {
    let id: JobId = args
        .job_id
        .parse()
        .map_err(|_| JobsError::UserError(format!("invalid job id '{}'", args.job_id)))?;
    let status = JobStatus::from_str(&args.status).ok_or_else(|| {
        JobsError::UserError(format!(
            "invalid status '{}': expected pending, in_progress, completed or failed",
            args.status
        ))
    })?;

    let config = ctx.load_config()?;
    let guard = DedupGuard::new(ctx.open_store(), &config);
    let before = match guard.store().fetch_job(&id) {
        Ok(job) => job,
        Err(StoreError::NotFound) => {
            return Err(JobsError::UserError(format!("job '{}' does not exist", id)));
        }
        Err(e) => return Err(e.into()),
    };
    let after = guard.set_status(&before, status)?;

    let event = Event::new(EventAction::JobStatus)
        .with_target(id.to_string())
        .with_details(json!({
            "kind": after.kind,
            "from": before.status,
            "to": after.status,
        }));
    append_event(ctx, &event)?;

    println!("{}: {} -> {}", id, before.status, after.status);
    Ok(())
}

fn parse_kind(input: &str) -> Result<JobKind> {
    JobKind::from_str(input).ok_or_else(|| {
        JobsError::UserError(format!(
            "invalid job kind '{}': expected email, statement or unit-account",
            input
        ))
    })
}
