//! Data directory resolution for billing-jobs.
//!
//! Every command works against one data directory holding the store, the
//! config file and the audit log:
//!
//! ```text
//! <data-dir>/
//!   config.yaml
//!   store/        locks, jobs and the target directory
//!   events/       events.ndjson
//! ```
//!
//! The directory comes from `--data-dir`, else `$BILLING_JOBS_HOME`, else
//! `.billing-jobs` in the working directory.

use crate::config::Config;
use crate::error::{JobsError, Result};
use crate::store::FileStore;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "BILLING_JOBS_HOME";

/// Data directory used when neither flag nor environment names one.
pub const DEFAULT_DATA_DIR: &str = ".billing-jobs";

/// Resolved paths for one data directory. All paths are absolute.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub data_dir: PathBuf,

    /// Root of the `FileStore`.
    pub store_dir: PathBuf,

    /// Directory holding `events.ndjson`.
    pub events_dir: PathBuf,
}

impl AppContext {
    /// Resolve the data directory from the flag, environment, or default.
    pub fn resolve(data_dir_flag: Option<&Path>) -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            JobsError::UserError(format!("failed to get current working directory: {}", e))
        })?;

        let chosen = match data_dir_flag {
            Some(dir) => dir.to_path_buf(),
            None => match env::var_os(DATA_DIR_ENV) {
                Some(dir) if !dir.is_empty() => PathBuf::from(dir),
                _ => PathBuf::from(DEFAULT_DATA_DIR),
            },
        };

        let data_dir = if chosen.is_absolute() {
            chosen
        } else {
            cwd.join(chosen)
        };
        Ok(Self::from_data_dir(data_dir))
    }

    /// Build the context for a known data directory.
    pub fn from_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            store_dir: data_dir.join("store"),
            events_dir: data_dir.join("events"),
            data_dir,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.yaml")
    }

    pub fn is_initialized(&self) -> bool {
        self.config_path().is_file() && self.store_dir.is_dir()
    }

    /// Fail with a hint to run `init` when the layout is missing.
    pub fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        Err(JobsError::UserError(format!(
            "billing-jobs data directory not initialized.\n\
             Expected config at: {}\n\n\
             Run `billing-jobs init` (or pass --data-dir / set {}) first.",
            self.config_path().display(),
            DATA_DIR_ENV
        )))
    }

    pub fn load_config(&self) -> Result<Config> {
        Config::load_or_default(self.config_path())
    }

    pub fn open_store(&self) -> Arc<FileStore> {
        Arc::new(FileStore::open(&self.store_dir))
    }
}

/// Resolve the context and require an initialized data directory.
pub fn require_initialized(data_dir_flag: Option<&Path>) -> Result<AppContext> {
    let ctx = AppContext::resolve(data_dir_flag)?;
    ctx.ensure_initialized()?;
    Ok(ctx)
}
