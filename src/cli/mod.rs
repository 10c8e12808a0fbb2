//! CLI argument parsing for billing-jobs.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// billing-jobs: duplicate-free enqueueing of billing background jobs.
///
/// Email, statement and unit-account jobs are written to a shared store.
/// Each job kind is serialized by its own store-persisted resource lock, and
/// a target never has more than one pending or in-progress job per kind.
#[derive(Parser, Debug)]
#[command(name = "billing-jobs")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory (default: $BILLING_JOBS_HOME, else ./.billing-jobs).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for billing-jobs.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize the data directory.
    ///
    /// Creates the store and events directories and a default config.yaml.
    Init,

    /// Register billing statements and contracts jobs may target.
    Register(RegisterCommand),

    /// Enqueue jobs, refusing targets that already have a live job.
    Enqueue(EnqueueCommand),

    /// Inspect jobs or change their status.
    Jobs(JobsCommand),

    /// Lock management commands.
    ///
    /// List, clear, or reap resource locks.
    Lock(LockCommand),

    /// Run the lock reaper in the foreground until interrupted.
    Reaper(ReaperArgs),

    /// Show the most recent audit events.
    Events(EventsArgs),
}

/// Register subcommands.
#[derive(Parser, Debug)]
pub struct RegisterCommand {
    #[command(subcommand)]
    pub target: RegisterTarget,
}

#[derive(Subcommand, Debug)]
pub enum RegisterTarget {
    /// Register (or rename) a billing statement.
    Statement(RegisterStatementArgs),

    /// Register (or update) a contract of a customer site.
    Contract(RegisterContractArgs),
}

#[derive(Parser, Debug)]
pub struct RegisterStatementArgs {
    /// Billing statement id.
    pub id: String,

    /// Display name used in messages.
    #[arg(long)]
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct RegisterContractArgs {
    /// Contract id.
    pub id: String,

    /// Customer site the contract belongs to.
    #[arg(long)]
    pub customer_site: String,

    /// Display name used in messages.
    #[arg(long)]
    pub name: String,
}

/// Enqueue subcommands.
#[derive(Parser, Debug)]
pub struct EnqueueCommand {
    #[command(subcommand)]
    pub kind: EnqueueKind,
}

#[derive(Subcommand, Debug)]
pub enum EnqueueKind {
    /// Email billing statements (one job per statement).
    Email(EnqueueEmailArgs),

    /// Generate statements for customer sites (one job per contract).
    Statement(EnqueueStatementArgs),

    /// Run the unit-account batch for a service period.
    #[command(name = "unit-account")]
    UnitAccount(EnqueueUnitAccountArgs),
}

#[derive(Parser, Debug)]
pub struct EnqueueEmailArgs {
    /// Billing statement ids.
    #[arg(required = true, num_args = 1..)]
    pub statement_ids: Vec<String>,

    /// send-all, send-email or send-to-gp (default: send-all).
    #[arg(long)]
    pub send_action: Option<String>,
}

#[derive(Parser, Debug)]
pub struct EnqueueStatementArgs {
    /// Customer site ids.
    #[arg(required = true, num_args = 1..)]
    pub customer_site_ids: Vec<String>,

    /// First day of the service period (YYYY-MM-DD).
    #[arg(long)]
    pub service_period_start: Option<String>,

    /// Enqueue every contract of the site instead of only the first.
    /// Always on when more than one site is given.
    #[arg(long)]
    pub all_contracts: bool,
}

#[derive(Parser, Debug)]
pub struct EnqueueUnitAccountArgs {
    /// Service period (YYYY-MM).
    pub service_period: String,
}

/// Jobs subcommands.
#[derive(Parser, Debug)]
pub struct JobsCommand {
    #[command(subcommand)]
    pub action: JobsAction,
}

#[derive(Subcommand, Debug)]
pub enum JobsAction {
    /// List jobs in creation order.
    List(JobsListArgs),

    /// Move a job to another status (pending, in_progress, completed, failed).
    SetStatus(JobsSetStatusArgs),
}

#[derive(Parser, Debug)]
pub struct JobsListArgs {
    /// Only jobs of this kind (email, statement, unit-account).
    #[arg(long)]
    pub kind: Option<String>,

    /// Only pending or in-progress jobs.
    #[arg(long)]
    pub live: bool,
}

#[derive(Parser, Debug)]
pub struct JobsSetStatusArgs {
    pub job_id: String,

    pub status: String,
}

/// Lock subcommands.
#[derive(Parser, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

/// Available lock actions.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// List all lock rows with holder, age and action.
    List,

    /// Clear a specific lock.
    ///
    /// Requires --force flag to prevent accidental clearing.
    Clear(LockClearArgs),

    /// Release every lock whose lease has expired.
    Reap,
}

/// Arguments for the `lock clear` command.
#[derive(Parser, Debug)]
pub struct LockClearArgs {
    /// Resource name of the lock (e.g. email-generation-process).
    pub resource: String,

    /// Force clearing the lock (required for safety).
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct ReaperArgs {
    /// Seconds between scans (default: reaper_interval_secs from config).
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct EventsArgs {
    /// Number of events to show, newest last.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
