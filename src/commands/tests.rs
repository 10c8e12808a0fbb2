//! End-to-end tests for the command handlers against an on-disk data dir.

use super::*;
use crate::cli::{
    EnqueueEmailArgs, EnqueueStatementArgs, EnqueueUnitAccountArgs, JobsListArgs,
    JobsSetStatusArgs, LockClearArgs, RegisterContractArgs, RegisterStatementArgs,
};
use crate::error::JobsError;
use crate::events::EventAction;
use crate::exit_codes;
use crate::jobs::{JobKind, JobStatus, SendAction};
use crate::locks::{LockLease, LockRow};
use crate::store::{JobStore, LockStore};
use crate::test_support::create_initialized_context;
use chrono::{Duration, Utc};
use clap::Parser;
use tempfile::TempDir;

fn register_statements(ctx: &AppContext, ids: &[&str]) {
    for id in ids {
        register::cmd_register_statement(
            ctx,
            RegisterStatementArgs {
                id: id.to_string(),
                name: format!("Statement {}", id),
            },
        )
        .unwrap();
    }
}

fn register_contract(ctx: &AppContext, id: &str, site: &str) {
    register::cmd_register_contract(
        ctx,
        RegisterContractArgs {
            id: id.to_string(),
            customer_site: site.to_string(),
            name: format!("Contract {}", id),
        },
    )
    .unwrap();
}

fn email_args(ids: &[&str]) -> EnqueueEmailArgs {
    EnqueueEmailArgs {
        statement_ids: ids.iter().map(|s| s.to_string()).collect(),
        send_action: None,
    }
}

fn event_actions(ctx: &AppContext) -> Vec<EventAction> {
    read_events(ctx).unwrap().iter().map(|e| e.action).collect()
}

// ============================================================================
// init / dispatch
// ============================================================================

#[test]
fn init_creates_layout_and_logs_event() {
    let (_temp_dir, ctx) = create_initialized_context();

    assert!(ctx.store_dir.is_dir());
    assert!(ctx.config_path().is_file());
    assert_eq!(ctx.load_config().unwrap().lock_lease_minutes, 30);
    assert_eq!(event_actions(&ctx), vec![EventAction::Init]);
}

#[test]
fn init_is_idempotent_and_keeps_config() {
    let (_temp_dir, ctx) = create_initialized_context();
    std::fs::write(ctx.config_path(), "lock_lease_minutes: 7\n").unwrap();

    init::cmd_init(&ctx).unwrap();

    assert_eq!(ctx.load_config().unwrap().lock_lease_minutes, 7);
    let events = read_events(&ctx).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].details["config_created"], false);
}

#[test]
fn init_rejects_invalid_existing_config() {
    let (_temp_dir, ctx) = create_initialized_context();
    std::fs::write(ctx.config_path(), "max_batch_size: 0\n").unwrap();

    let err = init::cmd_init(&ctx).unwrap_err();

    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
}

#[test]
fn dispatch_requires_initialized_data_dir() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("missing");
    let cli = Cli::try_parse_from([
        "billing-jobs",
        "--data-dir",
        data_dir.to_str().unwrap(),
        "lock",
        "list",
    ])
    .unwrap();

    let err = dispatch(cli).unwrap_err();

    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    assert!(err.to_string().contains("not initialized"));
}

#[test]
fn dispatch_init_then_enqueue_unit_account() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let dir = data_dir.to_str().unwrap();

    dispatch(Cli::try_parse_from(["billing-jobs", "--data-dir", dir, "init"]).unwrap()).unwrap();
    dispatch(
        Cli::try_parse_from(["billing-jobs", "enqueue", "unit-account", "2024-03", "--data-dir", dir])
            .unwrap(),
    )
    .unwrap();

    let ctx = AppContext::from_data_dir(&data_dir);
    let jobs = ctx.open_store().list_jobs(Some(JobKind::UnitAccount)).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].target.key, "2024-03");
}

// ============================================================================
// register / enqueue
// ============================================================================

#[test]
fn register_rejects_unsafe_ids() {
    let (_temp_dir, ctx) = create_initialized_context();

    let err = register::cmd_register_statement(
        &ctx,
        RegisterStatementArgs {
            id: "bs/1".to_string(),
            name: "Bad".to_string(),
        },
    )
    .unwrap_err();

    assert_eq!(err.exit_code(), exit_codes::VALIDATION_FAILURE);
}

#[test]
fn enqueue_email_creates_jobs_and_event() {
    let (_temp_dir, ctx) = create_initialized_context();
    register_statements(&ctx, &["bs-1", "bs-2"]);

    enqueue::cmd_enqueue_email(&ctx, email_args(&["bs-1", "bs-2"])).unwrap();

    let jobs = ctx.open_store().list_jobs(Some(JobKind::Email)).unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.params.send_action == Some(SendAction::SendAll)));

    let events = read_events(&ctx).unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.action, EventAction::Enqueue);
    assert_eq!(last.target.as_deref(), Some("email"));
    assert_eq!(last.details["job_ids"].as_array().unwrap().len(), 2);
}

#[test]
fn enqueue_duplicate_fails_without_event() {
    let (_temp_dir, ctx) = create_initialized_context();
    register_statements(&ctx, &["bs-1"]);
    enqueue::cmd_enqueue_email(&ctx, email_args(&["bs-1"])).unwrap();
    let events_before = read_events(&ctx).unwrap().len();

    let err = enqueue::cmd_enqueue_email(&ctx, email_args(&["bs-1"])).unwrap_err();

    assert_eq!(err.exit_code(), exit_codes::DUPLICATE_JOB);
    assert!(err.to_string().contains("Statement bs-1"));
    assert_eq!(read_events(&ctx).unwrap().len(), events_before);
}

#[test]
fn enqueue_email_rejects_bad_send_action() {
    let (_temp_dir, ctx) = create_initialized_context();
    register_statements(&ctx, &["bs-1"]);

    let err = enqueue::cmd_enqueue_email(
        &ctx,
        EnqueueEmailArgs {
            statement_ids: vec!["bs-1".to_string()],
            send_action: Some("fax".to_string()),
        },
    )
    .unwrap_err();

    assert!(matches!(err, JobsError::ValidationError(_)));
}

#[test]
fn enqueue_statement_first_or_all_contracts() {
    let (_temp_dir, ctx) = create_initialized_context();
    register_contract(&ctx, "c-1", "site-1");
    register_contract(&ctx, "c-2", "site-1");

    enqueue::cmd_enqueue_statement(
        &ctx,
        EnqueueStatementArgs {
            customer_site_ids: vec!["site-1".to_string()],
            service_period_start: Some("2024-03-01".to_string()),
            all_contracts: false,
        },
    )
    .unwrap();
    let jobs = ctx.open_store().list_jobs(Some(JobKind::Statement)).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].target.key, "c-1");

    // c-1 is still live, so the all-contracts batch is refused as a whole.
    let err = enqueue::cmd_enqueue_statement(
        &ctx,
        EnqueueStatementArgs {
            customer_site_ids: vec!["site-1".to_string()],
            service_period_start: None,
            all_contracts: true,
        },
    )
    .unwrap_err();
    assert!(matches!(err, JobsError::DuplicateJobConflict { .. }));
    assert_eq!(
        ctx.open_store().list_jobs(Some(JobKind::Statement)).unwrap().len(),
        1
    );
}

#[test]
fn enqueue_statement_rejects_bad_date() {
    let (_temp_dir, ctx) = create_initialized_context();
    register_contract(&ctx, "c-1", "site-1");

    let err = enqueue::cmd_enqueue_statement(
        &ctx,
        EnqueueStatementArgs {
            customer_site_ids: vec!["site-1".to_string()],
            service_period_start: Some("03/01/2024".to_string()),
            all_contracts: false,
        },
    )
    .unwrap_err();

    assert_eq!(err.exit_code(), exit_codes::VALIDATION_FAILURE);
}

#[test]
fn enqueue_uses_configured_resource_class() {
    let (_temp_dir, ctx) = create_initialized_context();
    std::fs::write(
        ctx.config_path(),
        "resource_classes:\n  unit_account: ua-custom\n",
    )
    .unwrap();
    let store = ctx.open_store();
    store
        .create_lock(&LockRow::new_held(
            "ua-custom",
            LockLease::new("elsewhere", Utc::now(), Duration::minutes(30)),
        ))
        .unwrap();

    let err = enqueue::cmd_enqueue_unit_account(
        &ctx,
        EnqueueUnitAccountArgs {
            service_period: "2024-03".to_string(),
        },
    )
    .unwrap_err();

    assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);
    assert!(err.to_string().contains("ua-custom"));
}

// ============================================================================
// jobs
// ============================================================================

#[test]
fn set_status_unblocks_new_enqueue() {
    let (_temp_dir, ctx) = create_initialized_context();
    register_statements(&ctx, &["bs-1"]);
    enqueue::cmd_enqueue_email(&ctx, email_args(&["bs-1"])).unwrap();
    let job = ctx.open_store().list_jobs(None).unwrap().remove(0);

    jobs::cmd_jobs_set_status(
        &ctx,
        JobsSetStatusArgs {
            job_id: job.id.to_string(),
            status: "completed".to_string(),
        },
    )
    .unwrap();
    enqueue::cmd_enqueue_email(&ctx, email_args(&["bs-1"])).unwrap();

    let all = ctx.open_store().list_jobs(None).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].status, JobStatus::Completed);
    assert_eq!(all[1].status, JobStatus::Pending);
    assert!(event_actions(&ctx).contains(&EventAction::JobStatus));

    jobs::cmd_jobs_list(
        &ctx,
        JobsListArgs {
            kind: Some("email".to_string()),
            live: true,
        },
    )
    .unwrap();
}

#[test]
fn set_status_refuses_to_revive_job_beside_live_successor() {
    let (_temp_dir, ctx) = create_initialized_context();
    register_statements(&ctx, &["bs-1"]);
    enqueue::cmd_enqueue_email(&ctx, email_args(&["bs-1"])).unwrap();
    let first = ctx.open_store().list_jobs(None).unwrap().remove(0);
    let set = |status: &str| {
        jobs::cmd_jobs_set_status(
            &ctx,
            JobsSetStatusArgs {
                job_id: first.id.to_string(),
                status: status.to_string(),
            },
        )
    };
    set("completed").unwrap();
    enqueue::cmd_enqueue_email(&ctx, email_args(&["bs-1"])).unwrap();

    let err = set("pending").unwrap_err();

    assert_eq!(err.exit_code(), exit_codes::DUPLICATE_JOB);
    let live = ctx
        .open_store()
        .fetch_live_jobs(JobKind::Email, &["bs-1".to_string()])
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_ne!(live[0].id, first.id);
    let status_events = event_actions(&ctx)
        .into_iter()
        .filter(|a| *a == EventAction::JobStatus)
        .count();
    assert_eq!(status_events, 1);
    // Moving it to another terminal status is still allowed.
    set("failed").unwrap();
}

#[test]
fn set_status_errors() {
    let (_temp_dir, ctx) = create_initialized_context();

    let bad_id = jobs::cmd_jobs_set_status(
        &ctx,
        JobsSetStatusArgs {
            job_id: "nope".to_string(),
            status: "completed".to_string(),
        },
    )
    .unwrap_err();
    assert_eq!(bad_id.exit_code(), exit_codes::USER_ERROR);

    let missing = jobs::cmd_jobs_set_status(
        &ctx,
        JobsSetStatusArgs {
            job_id: crate::jobs::JobId::new().to_string(),
            status: "completed".to_string(),
        },
    )
    .unwrap_err();
    assert!(missing.to_string().contains("does not exist"));

    let bad_status = jobs::cmd_jobs_set_status(
        &ctx,
        JobsSetStatusArgs {
            job_id: crate::jobs::JobId::new().to_string(),
            status: "done".to_string(),
        },
    )
    .unwrap_err();
    assert!(bad_status.to_string().contains("invalid status"));
}

#[test]
fn jobs_list_rejects_unknown_kind() {
    let (_temp_dir, ctx) = create_initialized_context();

    let err = jobs::cmd_jobs_list(
        &ctx,
        JobsListArgs {
            kind: Some("invoice".to_string()),
            live: false,
        },
    )
    .unwrap_err();

    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
}

// ============================================================================
// lock
// ============================================================================

#[test]
fn lock_clear_refuses_without_force() {
    let (_temp_dir, ctx) = create_initialized_context();

    let err = lock::cmd_lock_clear(
        &ctx,
        LockClearArgs {
            resource: "email-generation-process".to_string(),
            force: false,
        },
    )
    .unwrap_err();

    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    assert!(err.to_string().contains("--force"));
}

#[test]
fn lock_clear_unknown_resource_is_user_error() {
    let (_temp_dir, ctx) = create_initialized_context();

    let err = lock::cmd_lock_clear(
        &ctx,
        LockClearArgs {
            resource: "nothing-here".to_string(),
            force: true,
        },
    )
    .unwrap_err();

    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
}

#[test]
fn lock_clear_releases_and_logs() {
    let (_temp_dir, ctx) = create_initialized_context();
    let store = ctx.open_store();
    store
        .create_lock(&LockRow::new_held(
            "email-generation-process",
            LockLease::new("enqueue:email", Utc::now(), Duration::minutes(30)),
        ))
        .unwrap();

    lock::cmd_lock_clear(
        &ctx,
        LockClearArgs {
            resource: "email-generation-process".to_string(),
            force: true,
        },
    )
    .unwrap();

    assert!(!store.fetch_lock("email-generation-process").unwrap().is_locked);
    let events = read_events(&ctx).unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.action, EventAction::LockClear);
    assert_eq!(last.details["original_action"], "enqueue:email");
    lock::cmd_lock_list(&ctx).unwrap();
}

#[test]
fn lock_reap_releases_expired_and_logs() {
    let (_temp_dir, ctx) = create_initialized_context();
    let store = ctx.open_store();
    store
        .create_lock(&LockRow::new_held(
            "statement-generation-process",
            LockLease::new("crashed", Utc::now() - Duration::hours(2), Duration::minutes(30)),
        ))
        .unwrap();
    store
        .create_lock(&LockRow::new_held(
            "email-generation-process",
            LockLease::new("busy", Utc::now(), Duration::minutes(30)),
        ))
        .unwrap();

    lock::cmd_lock_reap(&ctx).unwrap();

    assert!(!store.fetch_lock("statement-generation-process").unwrap().is_locked);
    assert!(store.fetch_lock("email-generation-process").unwrap().is_locked);
    let events = read_events(&ctx).unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.action, EventAction::LockReap);
    assert_eq!(
        last.details["locks"][0]["resource"],
        "statement-generation-process"
    );
}

#[test]
fn lock_reap_with_nothing_expired_logs_nothing() {
    let (_temp_dir, ctx) = create_initialized_context();

    lock::cmd_lock_reap(&ctx).unwrap();

    assert_eq!(event_actions(&ctx), vec![EventAction::Init]);
}

#[test]
fn reaper_rejects_zero_interval() {
    let (_temp_dir, ctx) = create_initialized_context();

    let err = lock::cmd_reaper(&ctx, crate::cli::ReaperArgs { interval_secs: Some(0) })
        .unwrap_err();

    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
}

#[test]
fn events_command_tails_log() {
    let (_temp_dir, ctx) = create_initialized_context();
    register_statements(&ctx, &["bs-1", "bs-2"]);

    cmd_events(&ctx, EventsArgs { limit: 1 }).unwrap();
    cmd_events(&ctx, EventsArgs { limit: 100 }).unwrap();
}
