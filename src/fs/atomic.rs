//! Atomic filesystem operations for the store.
//!
//! All atomic writes follow this pattern:
//! 1. Write content to a uniquely named temporary file in the same directory
//! 2. Sync the file to disk (fsync)
//! 3. Either rename it over the target (replace) or hard-link it into place
//!    (exclusive create), then drop the temporary name
//!
//! Source and destination must be on the same filesystem for either step 3
//! to be atomic. On crash, a temporary file may remain (named
//! `.{filename}.{ulid}.tmp`); readers ignore dot-files.

use crate::store::{StoreError, StoreResult};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use ulid::Ulid;

/// Atomically write bytes to a file, replacing any previous content.
///
/// Readers never observe a partially written file: they see either the old
/// content or the new content.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> StoreResult<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StoreError::Unavailable(format!(
            "failed to atomically replace '{}': {}",
            path.display(),
            e
        ))
    })?;

    sync_parent(path);
    Ok(())
}

/// Atomically write a string to a file.
///
/// Convenience wrapper around `atomic_write` for string content.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> StoreResult<()> {
    atomic_write(path, content.as_bytes())
}

/// Atomically create a file that must not exist yet.
///
/// The content is fully written before the file becomes visible under its
/// final name. If the target already exists the call fails with
/// `StoreError::AlreadyExists` and the existing file is left untouched, so
/// among concurrent creators exactly one wins.
pub fn atomic_create_new<P: AsRef<Path>>(path: P, content: &[u8]) -> StoreResult<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;

    let linked = fs::hard_link(&temp_path, path);
    let _ = fs::remove_file(&temp_path);

    match linked {
        Ok(()) => {
            sync_parent(path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(StoreError::AlreadyExists),
        Err(e) => Err(StoreError::Unavailable(format!(
            "failed to create '{}': {}",
            path.display(),
            e
        ))),
    }
}

fn ensure_parent(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            StoreError::Unavailable(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Generate a temporary file path in the same directory as the target.
///
/// The ULID suffix keeps concurrent writers of the same target from sharing
/// a temporary file.
fn generate_temp_path(target: &Path) -> StoreResult<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::Unavailable("invalid file path".to_string()))?;

    Ok(parent.join(format!(".{}.{}.tmp", filename, Ulid::new())))
}

/// Write content to a file and sync to disk.
fn write_and_sync(path: &Path, content: &[u8]) -> StoreResult<()> {
    let mut file = File::create(path).map_err(|e| {
        StoreError::Unavailable(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        StoreError::Unavailable(format!("failed to write to temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        StoreError::Unavailable(format!("failed to sync temporary file to disk: {}", e))
    })?;

    Ok(())
}

fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}
