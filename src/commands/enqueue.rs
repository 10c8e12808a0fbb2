//! `billing-jobs enqueue`: create jobs through the dedup guard.

use crate::cli::{EnqueueEmailArgs, EnqueueStatementArgs, EnqueueUnitAccountArgs};
use crate::context::AppContext;
use crate::error::{JobsError, Result};
use crate::events::{Event, EventAction, append_event};
use crate::jobs::{
    DedupGuard, EmailTasks, JobId, JobKind, SendAction, StatementTasks, UnitAccountTasks,
};
use crate::store::FileStore;
use chrono::NaiveDate;
use serde_json::{Value, json};

pub fn cmd_enqueue_email(ctx: &AppContext, args: EnqueueEmailArgs) -> Result<()> {
    let send_action = args
        .send_action
        .as_deref()
        .map(parse_send_action)
        .transpose()?;
    let tasks = EmailTasks::new(open_guard(ctx)?);

    let ids = match args.statement_ids.as_slice() {
        [single] => vec![tasks.add_task(single, send_action)?],
        many => tasks.add_tasks(many, send_action)?,
    };

    record(
        ctx,
        JobKind::Email,
        &ids,
        json!({
            "statement_ids": args.statement_ids,
            "send_action": send_action,
        }),
    )
}

pub fn cmd_enqueue_statement(ctx: &AppContext, args: EnqueueStatementArgs) -> Result<()> {
    let start = args
        .service_period_start
        .as_deref()
        .map(parse_period_start)
        .transpose()?;
    let tasks = StatementTasks::new(open_guard(ctx)?);

    let ids = if args.customer_site_ids.len() == 1 && !args.all_contracts {
        vec![tasks.add_task(&args.customer_site_ids[0], start)?]
    } else {
        tasks.add_tasks(&args.customer_site_ids, start)?
    };

    record(
        ctx,
        JobKind::Statement,
        &ids,
        json!({
            "customer_site_ids": args.customer_site_ids,
            "service_period_start": start,
        }),
    )
}

pub fn cmd_enqueue_unit_account(ctx: &AppContext, args: EnqueueUnitAccountArgs) -> Result<()> {
    let tasks = UnitAccountTasks::new(open_guard(ctx)?);

    let id = tasks.add_task(&args.service_period)?;

    record(
        ctx,
        JobKind::UnitAccount,
        &[id],
        json!({ "service_period": args.service_period.trim() }),
    )
}

fn open_guard(ctx: &AppContext) -> Result<DedupGuard<FileStore>> {
    let config = ctx.load_config()?;
    Ok(DedupGuard::new(ctx.open_store(), &config))
}

/// Log the enqueue and print the created ids, one per line.
fn record(ctx: &AppContext, kind: JobKind, ids: &[JobId], mut details: Value) -> Result<()> {
    details["job_ids"] = json!(ids.iter().map(JobId::to_string).collect::<Vec<_>>());
    let event = Event::new(EventAction::Enqueue)
        .with_target(kind.as_str())
        .with_details(details);
    append_event(ctx, &event)?;

    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

fn parse_send_action(input: &str) -> Result<SendAction> {
    SendAction::from_str(input).ok_or_else(|| {
        JobsError::ValidationError(format!(
            "invalid send action '{}': expected send-all, send-email or send-to-gp",
            input
        ))
    })
}

fn parse_period_start(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| {
        JobsError::ValidationError(format!(
            "invalid service period start '{}': expected YYYY-MM-DD",
            input
        ))
    })
}
