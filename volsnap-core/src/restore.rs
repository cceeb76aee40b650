/*!
Restore engine: bring every target back to its newest snapshot.

For each target with a source path the engine makes sure the directory
exists, applies the configured `chmod`/`chown`, then lists the snapshots
stored under the destination's key prefix, downloads the greatest name into
the temp directory and extracts it over the source path. A destination with
no snapshots leaves the directory as it is.
*/

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info, warn};

use crate::archive::{extract_archive, temp_archive};
use crate::config::BackupTarget;
use crate::naming::newest;
use crate::observability::{record_snapshot_restored, record_target_failure};
use crate::outcome::{TargetOutcome, TargetStatus};
use crate::storage::{BackendResolver, DefaultResolver};
use crate::Result;

/// Restores targets from their newest snapshot
pub struct RestoreEngine<R = DefaultResolver> {
    tmp_dir: PathBuf,
    resolver: R,
}

impl RestoreEngine<DefaultResolver> {
    pub fn new<P: Into<PathBuf>>(tmp_dir: P) -> Self {
        Self::with_resolver(tmp_dir, DefaultResolver)
    }
}

impl<R: BackendResolver> RestoreEngine<R> {
    pub fn with_resolver<P: Into<PathBuf>>(tmp_dir: P, resolver: R) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
            resolver,
        }
    }

    /// Restore every target in order
    ///
    /// Fatal errors (unsupported scheme, remote storage failure) abort the
    /// run; anything else is reported as a failed target.
    pub fn run_all(&self, targets: &[BackupTarget]) -> Result<Vec<TargetOutcome>> {
        let mut outcomes = Vec::with_capacity(targets.len());

        for (index, target) in targets.iter().enumerate() {
            let Some(source) = target.source() else {
                debug!(index, "Skipping restore entry without path");
                outcomes.push(TargetOutcome::skipped(index));
                continue;
            };

            let status = match self.restore_target(source, target) {
                Ok(Some(snapshot)) => TargetStatus::Restored { snapshot },
                Ok(None) => TargetStatus::NoSnapshot,
                Err(e) if e.is_fatal() => {
                    error!(index, path = %source.display(), error = %e, "Restore run aborted");
                    record_target_failure();
                    return Err(e);
                }
                Err(e) => {
                    error!(index, path = %source.display(), error = %e, "Restore failed");
                    record_target_failure();
                    TargetStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(TargetOutcome::new(index, Some(source.to_path_buf()), status));
        }

        Ok(outcomes)
    }

    fn restore_target(&self, source: &Path, target: &BackupTarget) -> Result<Option<String>> {
        info!(path = %source.display(), "Restoring");
        fs::create_dir_all(source)?;

        if let Some(mode) = &target.post_restore_chmod {
            run_best_effort("chmod", mode, source);
        }
        if let Some(owner) = &target.post_restore_chown {
            run_best_effort("chown", owner, source);
        }

        let destination = target.destination()?;
        let backend = self
            .resolver
            .resolve(&destination, &target.destination_options)?;

        debug!(destination = %destination, backend = destination.kind(), "Listing snapshots");
        let keys = backend.list(destination.key_prefix())?;
        let Some(key) = newest(&keys) else {
            info!(destination = %destination, "No snapshot to restore");
            return Ok(None);
        };
        debug!(candidates = keys.len(), snapshot = %key, "Selected newest snapshot");

        let archive = temp_archive(&self.tmp_dir, key)?;
        backend.get(key, &archive)?;
        extract_archive(&archive, source)?;
        record_snapshot_restored();

        info!(path = %source.display(), snapshot = %key, "Done restore");
        Ok(Some(key.to_string()))
    }
}

/// Run `program arg path`, logging instead of failing when it does not succeed
fn run_best_effort(program: &str, arg: &str, path: &Path) {
    info!(program, arg, path = %path.display(), "Applying post-restore command");
    match Command::new(program).arg(arg).arg(path).status() {
        Ok(status) if status.success() => {}
        Ok(status) => warn!(program, arg, %status, "Post-restore command failed"),
        Err(e) => warn!(program, arg, error = %e, "Failed to run post-restore command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::Destination;
    use crate::storage::{DestinationOptions, MemoryStorage, MockStorageBackend, StorageBackend};
    use crate::test_support::{archive_bytes, dir_is_empty, memory_resolver};
    use crate::VolsnapError;
    use tempfile::TempDir;

    #[test]
    fn test_no_snapshot_creates_directory() {
        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let source = root.path().join("data/app");

        let engine = RestoreEngine::with_resolver(tmp.path(), memory_resolver(MemoryStorage::new()));
        let outcomes = engine
            .run_all(&[BackupTarget::new(&source, "s3://bucket/app")])
            .unwrap();

        assert_eq!(outcomes[0].status, TargetStatus::NoSnapshot);
        assert!(source.is_dir());
        assert!(dir_is_empty(&source));
    }

    #[test]
    fn test_newest_snapshot_is_restored() {
        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let memory = MemoryStorage::new();
        memory.insert(
            "A-20200101-000000.tar.gz",
            archive_bytes(&[("version.txt", "old")]),
        );
        memory.insert(
            "A-20200102-000000.tar.gz",
            archive_bytes(&[("version.txt", "new")]),
        );

        let engine = RestoreEngine::with_resolver(tmp.path(), memory_resolver(memory));
        let outcomes = engine
            .run_all(&[BackupTarget::new(root.path(), "s3://bucket/A")])
            .unwrap();

        assert_eq!(
            outcomes[0].status,
            TargetStatus::Restored {
                snapshot: "A-20200102-000000.tar.gz".to_string()
            }
        );
        assert_eq!(
            fs::read_to_string(root.path().join("version.txt")).unwrap(),
            "new"
        );
        assert!(dir_is_empty(tmp.path()));
    }

    #[test]
    fn test_only_newest_key_is_fetched() {
        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();

        let engine = RestoreEngine::with_resolver(
            tmp.path(),
            |_: &Destination, _: &DestinationOptions| -> Result<Box<dyn StorageBackend>> {
                let mut mock = MockStorageBackend::new();
                mock.expect_list().withf(|prefix| prefix == "A").returning(|_| {
                    Ok(vec![
                        "A-20200101-000000.tar.gz".to_string(),
                        "A-20200102-000000.tar.gz".to_string(),
                    ])
                });
                mock.expect_get()
                    .withf(|key, _| key == "A-20200102-000000.tar.gz")
                    .times(1)
                    .returning(|_, local| {
                        fs::write(local, archive_bytes(&[("a.txt", "alpha")]))?;
                        Ok(())
                    });
                Ok(Box::new(mock))
            },
        );
        engine
            .run_all(&[BackupTarget::new(root.path(), "s3://bucket/A")])
            .unwrap();

        assert_eq!(fs::read_to_string(root.path().join("a.txt")).unwrap(), "alpha");
    }

    #[test]
    fn test_tmp_shared_with_destination_keeps_snapshot() {
        let root = TempDir::new().unwrap();
        let shared = TempDir::new().unwrap();
        let snapshot = shared.path().join("app-20200101-000000.tar.gz");
        let bytes = archive_bytes(&[("a.txt", "alpha")]);
        fs::write(&snapshot, &bytes).unwrap();

        let engine = RestoreEngine::new(shared.path());
        let outcomes = engine
            .run_all(&[BackupTarget::new(
                root.path(),
                format!("file://{}/app", shared.path().display()),
            )])
            .unwrap();

        assert!(matches!(outcomes[0].status, TargetStatus::Restored { .. }));
        assert_eq!(fs::read_to_string(root.path().join("a.txt")).unwrap(), "alpha");
        assert_eq!(fs::read(&snapshot).unwrap(), bytes);
        assert_eq!(fs::read_dir(shared.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_targets_without_path_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let engine = RestoreEngine::with_resolver(tmp.path(), memory_resolver(MemoryStorage::new()));
        let target = BackupTarget {
            destination: Some("ftp://ignored/app".to_string()),
            ..Default::default()
        };

        let outcomes = engine.run_all(&[target]).unwrap();
        assert_eq!(outcomes, vec![TargetOutcome::skipped(0)]);
    }

    #[test]
    fn test_unsupported_scheme_is_error() {
        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let engine = RestoreEngine::new(tmp.path());

        let err = engine
            .run_all(&[BackupTarget::new(root.path(), "ftp://host/app")])
            .unwrap_err();
        assert!(matches!(err, VolsnapError::UnsupportedScheme(_)));
    }

    #[test]
    fn test_remote_list_failure_propagates() {
        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let engine = RestoreEngine::with_resolver(
            tmp.path(),
            |_: &Destination, _: &DestinationOptions| -> Result<Box<dyn StorageBackend>> {
                let mut mock = MockStorageBackend::new();
                mock.expect_list()
                    .returning(|_| Err(VolsnapError::storage("access denied")));
                Ok(Box::new(mock))
            },
        );

        let err = engine
            .run_all(&[BackupTarget::new(root.path(), "s3://bucket/app")])
            .unwrap_err();
        assert!(matches!(err, VolsnapError::Storage(_)));
    }

    #[test]
    fn test_local_failure_does_not_stop_run() {
        let root = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        fs::write(backups.path().join("app-20200101-000000.tar.gz"), b"truncated").unwrap();

        let memory = MemoryStorage::new();
        memory.insert("other-20200101-000000.tar.gz", archive_bytes(&[("b.txt", "beta")]));

        let engine = RestoreEngine::with_resolver(tmp.path(), memory_resolver(memory));
        let targets = vec![
            BackupTarget::new(
                root.path().join("one"),
                format!("file://{}/app", backups.path().display()),
            ),
            BackupTarget::new(root.path().join("two"), "s3://bucket/other"),
        ];
        let outcomes = engine.run_all(&targets).unwrap();

        assert!(outcomes[0].is_failure());
        assert_eq!(
            fs::read_to_string(root.path().join("two/b.txt")).unwrap(),
            "beta"
        );
    }

    #[test]
    fn test_corrupt_snapshot_fails_target_and_cleans_up() {
        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let memory = MemoryStorage::new();
        memory.insert("app-20200101-000000.tar.gz", b"not a tarball".to_vec());

        let engine = RestoreEngine::with_resolver(tmp.path(), memory_resolver(memory));
        let outcomes = engine
            .run_all(&[BackupTarget::new(root.path(), "s3://bucket/app")])
            .unwrap();

        assert!(outcomes[0].is_failure());
        assert!(dir_is_empty(tmp.path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_chmod_applied_before_restore() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let source = root.path().join("data");
        let mut target = BackupTarget::new(&source, "s3://bucket/app");
        target.post_restore_chmod = Some("700".to_string());

        let engine = RestoreEngine::with_resolver(tmp.path(), memory_resolver(MemoryStorage::new()));
        engine.run_all(&[target]).unwrap();

        let mode = fs::metadata(&source).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_failing_post_restore_command_is_not_an_error() {
        let root = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let mut target = BackupTarget::new(root.path(), "s3://bucket/app");
        target.post_restore_chown = Some("no-such-user-volsnap:no-such-group".to_string());

        let engine = RestoreEngine::with_resolver(tmp.path(), memory_resolver(MemoryStorage::new()));
        let outcomes = engine.run_all(&[target]).unwrap();
        assert_eq!(outcomes[0].status, TargetStatus::NoSnapshot);
    }
}
