//! `billing-jobs lock ...` and `billing-jobs reaper`.

use crate::cli::{LockClearArgs, ReaperArgs};
use crate::config::Config;
use crate::context::AppContext;
use crate::error::{JobsError, Result};
use crate::events::{Event, EventAction, append_event};
use crate::locks::{LockInfo, ReapedLock, Reaper, ResourceLocks, reap_expired};
use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

pub fn cmd_lock_list(ctx: &AppContext) -> Result<()> {
    let config = ctx.load_config()?;
    let locks = ResourceLocks::new(ctx.open_store(), config.lease_ttl());

    let infos = locks.list()?;
    let held: Vec<&LockInfo> = infos.iter().filter(|l| l.row.is_locked).collect();

    if held.is_empty() {
        println!("No active locks.");
    } else {
        println!("Active locks ({}):", held.len());
        println!();
        for info in &held {
            print_lock(info, &config);
            println!();
        }
    }

    let free = infos.len() - held.len();
    if free > 0 {
        println!("{} free lock row(s).", free);
    }

    let stale_count = held.iter().filter(|l| l.is_stale).count();
    if stale_count > 0 {
        println!(
            "Note: {} lock(s) have expired leases. Run `billing-jobs lock reap` to release them.",
            stale_count
        );
    }

    Ok(())
}

pub fn cmd_lock_clear(ctx: &AppContext, args: LockClearArgs) -> Result<()> {
    if !args.force {
        return Err(JobsError::UserError(format!(
            "refusing to clear lock without --force flag.\n\n\
             Clearing a lock lets another enqueue run while the holder may still be writing.\n\
             Only clear locks if you are certain the lock holder has crashed.\n\n\
             To clear the lock, run:\n  billing-jobs lock clear {} --force",
            args.resource
        )));
    }

    let config = ctx.load_config()?;
    let locks = ResourceLocks::new(ctx.open_store(), config.lease_ttl());
    let cleared = locks.clear(&args.resource)?;

    let lease = cleared.row.lease.as_ref();
    let event = Event::new(EventAction::LockClear)
        .with_target(cleared.row.resource_id.clone())
        .with_details(json!({
            "was_locked": cleared.row.is_locked,
            "was_stale": cleared.is_stale,
            "holder": lease.map(|l| l.holder.clone()),
            "original_action": lease.map(|l| l.action.clone()),
            "age_minutes": lease.map(|l| l.age().num_minutes()),
            "force": args.force,
        }));
    if let Err(e) = append_event(ctx, &event) {
        eprintln!("Warning: failed to log lock_clear event: {}", e);
    }

    if cleared.row.is_locked {
        println!("Cleared lock: {}", cleared.row.resource_id);
        println!();
        println!("Lock details:");
        print_lock(&cleared, &config);
    } else {
        println!("Nothing to clear: {}", cleared);
    }

    Ok(())
}

pub fn cmd_lock_reap(ctx: &AppContext) -> Result<()> {
    let store = ctx.open_store();
    let reaped = reap_expired(store.as_ref(), Utc::now())?;

    if reaped.is_empty() {
        println!("No expired locks.");
        return Ok(());
    }

    log_reaped(ctx, &reaped)?;
    for lock in &reaped {
        println!(
            "Released {} (holder: {}, action: {})",
            lock.resource_id,
            lock.holder.as_deref().unwrap_or("unknown"),
            lock.action.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

/// Run the reaper in the foreground. Only returns on error; stop it with
/// Ctrl-C.
pub fn cmd_reaper(ctx: &AppContext, args: ReaperArgs) -> Result<()> {
    let config = ctx.load_config()?;
    let interval = match args.interval_secs {
        Some(0) => {
            return Err(JobsError::UserError(
                "--interval-secs must be greater than 0".to_string(),
            ));
        }
        Some(secs) => Duration::from_secs(secs),
        None => config.reaper_interval(),
    };

    info!(interval_secs = interval.as_secs(), "starting lock reaper");
    println!(
        "Reaping expired locks every {}s in {} (Ctrl-C to stop).",
        interval.as_secs(),
        ctx.store_dir.display()
    );

    let event_ctx = ctx.clone();
    let reaper = Reaper::spawn(ctx.open_store(), interval, move |reaped| {
        if let Err(e) = log_reaped(&event_ctx, reaped) {
            warn!(error = %e, "failed to log lock_reap event");
        }
        for lock in reaped {
            println!("Released {}", lock.resource_id);
        }
    });
    reaper.join();

    Ok(())
}

fn log_reaped(ctx: &AppContext, reaped: &[ReapedLock]) -> Result<()> {
    let locks: Vec<_> = reaped
        .iter()
        .map(|lock| {
            json!({
                "resource": lock.resource_id,
                "holder": lock.holder,
                "action": lock.action,
                "expired_at": lock.expired_at,
            })
        })
        .collect();
    let event = Event::new(EventAction::LockReap).with_details(json!({ "locks": locks }));
    append_event(ctx, &event)
}

fn print_lock(info: &LockInfo, config: &Config) {
    let row = &info.row;
    println!("  {}:", row.resource_id);
    if let Some((kind, _)) = config
        .resource_classes
        .entries()
        .find(|(_, resource)| *resource == row.resource_id)
    {
        println!("    Guards:     {} enqueues", kind);
    }
    if let Some(lease) = &row.lease {
        println!("    Holder:     {}", lease.holder);
        if let Some(pid) = lease.pid {
            println!("    PID:        {}", pid);
        }
        println!(
            "    Acquired:   {}",
            lease.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("    Age:        {}", lease.age_string());
        println!(
            "    Expires:    {}",
            lease.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("    Action:     {}", lease.action);
    }
    if info.is_stale {
        println!("    Status:     STALE (lease expired)");
    }
    println!("    Version:    {}", row.version);
}
