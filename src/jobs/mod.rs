//! Background job records and duplicate-free enqueueing.
//!
//! A job is *live* while Pending or InProgress. For each job kind at most
//! one live job may exist per target key; `DedupGuard` enforces this by
//! checking, taking the kind's resource lock, checking again, then writing
//! the whole batch.

mod guard;
mod tasks;
mod types;


pub use guard::DedupGuard;
pub use tasks::{EmailTasks, StatementTasks, UnitAccountTasks, parse_service_period};
pub use types::{JobId, JobKind, JobParams, JobRecord, JobSource, JobStatus, SendAction, TargetRef};
