//! Resource locks.
//!
//! A resource lock is a named, store-persisted mutual-exclusion flag used
//! to serialize work across process instances that share nothing but the
//! store:
//! - One row per resource class (e.g. `email-generation-process`)
//! - `is_locked` plus a lease (holder, action, expiry) while held
//! - Every write bumps the row version; acquisition is a version-checked
//!   update, or an exclusive create for a never-seen resource
//!
//! # RAII Guards
//!
//! Locks are held through `LockGuard`, which releases on drop. Release is
//! keyed on the lease token, so releasing twice, or releasing after the
//! lease was taken over, leaves the row alone.
//!
//! # Leases
//!
//! A holder that crashes never releases. Its lease expires after the
//! configured TTL; the next acquirer may then take the row over, and the
//! reaper frees it in the background.

mod guard;
mod metadata;
mod operations;
mod reaper;
mod types;


pub use guard::LockGuard;
pub use metadata::LockLease;
pub(crate) use metadata::get_owner_string;
pub use operations::ResourceLocks;
pub use reaper::{ReapedLock, Reaper, reap_expired};
pub use types::{LockInfo, LockRow, RowId};
