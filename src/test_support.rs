use crate::commands::init::cmd_init;
use crate::context::AppContext;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard};
use tempfile::TempDir;

static CWD_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub(crate) struct DirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl DirGuard {
    pub(crate) fn new(new_dir: &Path) -> Self {
        // Changing the process current working directory is global and not thread-safe.
        // Lock it so tests don't race even if a #[serial] annotation is missed.
        let lock = CWD_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(new_dir).unwrap();
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// Sets or removes an environment variable, restoring it on drop.
/// Callers must be `#[serial]`.
pub(crate) struct EnvGuard {
    key: OsString,
    original: Option<OsString>,
}

impl EnvGuard {
    pub(crate) fn set(key: &str, value: impl AsRef<OsStr>) -> Self {
        let original = std::env::var_os(key);
        // SAFETY: env-mutating tests are serialized with #[serial].
        unsafe { std::env::set_var(key, value) };
        Self {
            key: key.into(),
            original,
        }
    }

    pub(crate) fn remove(key: &str) -> Self {
        let original = std::env::var_os(key);
        // SAFETY: env-mutating tests are serialized with #[serial].
        unsafe { std::env::remove_var(key) };
        Self {
            key: key.into(),
            original,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: see `EnvGuard::set`.
        unsafe {
            match &self.original {
                Some(value) => std::env::set_var(&self.key, value),
                None => std::env::remove_var(&self.key),
            }
        }
    }
}

/// A temp data directory that has been through `init`.
pub(crate) fn create_initialized_context() -> (TempDir, AppContext) {
    let temp_dir = TempDir::new().unwrap();
    let ctx = AppContext::from_data_dir(temp_dir.path().join("data"));
    cmd_init(&ctx).unwrap();
    (temp_dir, ctx)
}
