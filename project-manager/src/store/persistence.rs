// Filesystem helpers shared by the store
// Whole-file rewrites go through write-to-temp + rename so a crash mid-write never
// leaves a truncated record file behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// Filesystem failure with the path it happened on
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("{} is inside {}; refusing to copy a directory into itself", target.display(), source_dir.display())]
    CopyIntoSelf { source_dir: PathBuf, target: PathBuf },

    #[error("Backup id file contents '{0}' is not a valid id")]
    BadBackupId(String),
}

impl StoreError {
    pub fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Atomically save data to a file using write-to-temp + rename
pub fn atomic_write(path: &Path, contents: &str) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| {
        StoreError::io(
            "resolve parent of",
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"),
        )
    })?;

    fs::create_dir_all(parent).map_err(|e| StoreError::io("create directory", parent, e))?;

    // Temp file in the same directory so the rename stays on one filesystem
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown"),
        std::process::id()
    ));

    fs::write(&temp_path, contents).map_err(|e| StoreError::io("write", &temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StoreError::io("replace", path, e)
    })?;

    Ok(())
}

/// Create `path` with `contents` unless it exists (or `overwrite` is set).
/// Returns whether the file was written.
pub fn create_file(path: &Path, contents: &str, overwrite: bool) -> Result<bool, StoreError> {
    if !overwrite && path.exists() {
        return Ok(false);
    }
    atomic_write(path, contents)?;
    Ok(true)
}

/// Remove a file; a file that is already gone counts as removed
pub fn remove_file_if_exists(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io("delete", path, e)),
    }
}

/// Copy the tree under `source` into `target`, overwriting existing files.
/// Entries under `skip` (if given) are left out. Returns the number of files copied.
pub fn copy_dir_recursive(
    source: &Path,
    target: &Path,
    skip: Option<&Path>,
) -> Result<usize, StoreError> {
    if target.starts_with(source) && skip.map_or(true, |s| !target.starts_with(s)) {
        return Err(StoreError::CopyIntoSelf {
            source_dir: source.to_path_buf(),
            target: target.to_path_buf(),
        });
    }

    fs::create_dir_all(target).map_err(|e| StoreError::io("create directory", target, e))?;

    let mut copied = 0;
    let walker = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| skip.map_or(true, |s| !entry.path().starts_with(s)));

    for entry in walker {
        let entry = entry.map_err(|e| StoreError::Walk {
            path: source.to_path_buf(),
            source: e,
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)
                .map_err(|e| StoreError::io("create directory", &destination, e))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &destination)
                .map_err(|e| StoreError::io("copy", entry.path(), e))?;
            copied += 1;
        }
    }

    Ok(copied)
}
