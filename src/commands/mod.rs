//! Command implementations for billing-jobs.
//!
//! `dispatch` resolves the data directory once and routes each command to
//! its handler. Every command except `init` requires an initialized data
//! directory.

pub(crate) mod enqueue;
pub(crate) mod init;
pub(crate) mod jobs;
pub(crate) mod lock;
pub(crate) mod register;

#[cfg(test)]
mod tests;

use crate::cli::{
    Cli, Command, EnqueueKind, EventsArgs, JobsAction, LockAction, RegisterTarget,
};
use crate::context::{AppContext, require_initialized};
use crate::error::Result;
use crate::events::read_events;

/// Dispatch a parsed command line to its implementation.
pub fn dispatch(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir.as_deref();

    if let Command::Init = cli.command {
        return init::cmd_init(&AppContext::resolve(data_dir)?);
    }

    let ctx = require_initialized(data_dir)?;
    run(&ctx, cli.command)
}

fn run(ctx: &AppContext, command: Command) -> Result<()> {
    match command {
        Command::Init => init::cmd_init(ctx),
        Command::Register(cmd) => match cmd.target {
            RegisterTarget::Statement(args) => register::cmd_register_statement(ctx, args),
            RegisterTarget::Contract(args) => register::cmd_register_contract(ctx, args),
        },
        Command::Enqueue(cmd) => match cmd.kind {
            EnqueueKind::Email(args) => enqueue::cmd_enqueue_email(ctx, args),
            EnqueueKind::Statement(args) => enqueue::cmd_enqueue_statement(ctx, args),
            EnqueueKind::UnitAccount(args) => enqueue::cmd_enqueue_unit_account(ctx, args),
        },
        Command::Jobs(cmd) => match cmd.action {
            JobsAction::List(args) => jobs::cmd_jobs_list(ctx, args),
            JobsAction::SetStatus(args) => jobs::cmd_jobs_set_status(ctx, args),
        },
        Command::Lock(cmd) => match cmd.action {
            LockAction::List => lock::cmd_lock_list(ctx),
            LockAction::Clear(args) => lock::cmd_lock_clear(ctx, args),
            LockAction::Reap => lock::cmd_lock_reap(ctx),
        },
        Command::Reaper(args) => lock::cmd_reaper(ctx, args),
        Command::Events(args) => cmd_events(ctx, args),
    }
}

fn cmd_events(ctx: &AppContext, args: EventsArgs) -> Result<()> {
    let events = read_events(ctx)?;
    let skip = events.len().saturating_sub(args.limit);

    for event in &events[skip..] {
        println!(
            "{}  {:<10} {:<24} {}",
            event.ts.format("%Y-%m-%d %H:%M:%S"),
            event.action.to_string(),
            event.target.as_deref().unwrap_or("-"),
            event.actor
        );
    }
    Ok(())
}
