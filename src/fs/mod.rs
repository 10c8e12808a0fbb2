//! Filesystem utilities for the directory-backed store.
//!
//! Rows are individual JSON files. Replacing a row is an atomic
//! temp-file + rename; creating a row is an atomic exclusive create so that
//! "someone else created it first" is observable.

pub mod atomic;

pub use atomic::{atomic_create_new, atomic_write, atomic_write_file};
