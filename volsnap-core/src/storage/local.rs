/*!
Local filesystem storage backend.

Snapshots are plain files; a destination `file://backups/app` keeps its
snapshots as siblings `backups/app-<timestamp>.tar.gz`. Any directory, local
or a network mount, works as long as it is writable.
*/

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::StorageBackend;
use crate::{Result, VolsnapError};

/// Local filesystem storage backend
///
/// Parent directories of a key are created on `put`.
///
/// # Example
/// ```rust
/// use volsnap_core::storage::{LocalFileStorage, StorageBackend};
///
/// let dir = tempfile::tempdir()?;
/// let archive = dir.path().join("upload.tar.gz");
/// std::fs::write(&archive, b"archive bytes")?;
///
/// let storage = LocalFileStorage::with_base_dir(dir.path().join("backups"));
/// storage.put(&archive, "app-20200101-000000.tar.gz")?;
/// assert_eq!(storage.list("app")?, vec!["app-20200101-000000.tar.gz".to_string()]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    /// Optional base directory for all keys
    base_dir: Option<PathBuf>,
}

impl LocalFileStorage {
    /// Create a backend whose keys are used as paths as-is
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Create a backend whose keys are resolved relative to `base_dir`
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    /// Resolve the full path for a given key
    fn resolve_path(&self, key: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(key),
            None => PathBuf::from(key),
        }
    }

    /// Refuse a copy whose source and destination are the same file
    fn check_distinct(from: &Path, to: &Path) -> Result<()> {
        let same = match (fs::canonicalize(from), fs::canonicalize(to)) {
            (Ok(from), Ok(to)) => from == to,
            _ => false,
        };
        if same {
            return Err(VolsnapError::local_storage(format!(
                "Refusing to copy {} onto itself",
                from.display()
            )));
        }
        Ok(())
    }

    /// Ensure the parent directory exists, creating it if necessary
    fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    VolsnapError::local_storage(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

impl Default for LocalFileStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for LocalFileStorage {
    fn put(&self, local: &Path, key: &str) -> Result<()> {
        let full_path = self.resolve_path(key);
        info!(from = %local.display(), to = %full_path.display(), "Copying snapshot");

        self.ensure_parent_dir(&full_path)?;
        Self::check_distinct(local, &full_path)?;

        fs::copy(local, &full_path).map_err(|e| {
            VolsnapError::local_storage(format!(
                "Failed to copy {} to {}: {}",
                local.display(),
                full_path.display(),
                e
            ))
        })?;

        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_prefix = self.resolve_path(prefix);
        let Some(stem) = full_prefix.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(Vec::new());
        };
        let dir = match full_prefix.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        if !dir.is_dir() {
            debug!(dir = %dir.display(), "Snapshot directory does not exist yet");
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| {
            VolsnapError::local_storage(format!("Failed to list {}: {}", dir.display(), e))
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                VolsnapError::local_storage(format!("Failed to list {}: {}", dir.display(), e))
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&stem) && entry.path().is_file() {
                keys.push(
                    Path::new(prefix)
                        .with_file_name(&name)
                        .to_string_lossy()
                        .into_owned(),
                );
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str, local: &Path) -> Result<()> {
        let full_path = self.resolve_path(key);
        info!(from = %full_path.display(), to = %local.display(), "Copying snapshot");
        Self::check_distinct(&full_path, local)?;

        fs::copy(&full_path, local).map_err(|e| {
            VolsnapError::local_storage(format!(
                "Failed to copy {} to {}: {}",
                full_path.display(),
                local.display(),
                e
            ))
        })?;
        Ok(())
    }
}
