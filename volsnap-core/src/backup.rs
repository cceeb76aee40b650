/*!
Backup engine: archive every configured target and store the snapshot.

Targets are processed one after another. For each target with a source
path the engine parses the destination and exclusion patterns, archives the
source into the temp directory, uploads the archive under a timestamped key
and removes the temp archive again, whether or not the upload worked.

A failing target does not stop the run unless the error is fatal (see
[`crate::VolsnapError::is_fatal`]): an unsupported destination scheme or a remote
storage error aborts the remaining targets, a failed local copy does not.
*/

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::archive::{create_archive, temp_archive};
use crate::config::BackupTarget;
use crate::exclude::ExclusionMatcher;
use crate::naming::snapshot_name;
use crate::observability::{record_snapshot_created, record_target_failure};
use crate::outcome::{TargetOutcome, TargetStatus};
use crate::storage::{BackendResolver, DefaultResolver};
use crate::Result;

/// Creates and stores snapshots of backup targets
///
/// # Example
/// ```rust
/// use volsnap_core::{BackupEngine, BackupTarget, TargetStatus};
///
/// let source = tempfile::tempdir()?;
/// let backups = tempfile::tempdir()?;
/// std::fs::write(source.path().join("a.txt"), "alpha")?;
///
/// let target = BackupTarget::new(
///     source.path(),
///     format!("file://{}/app", backups.path().display()),
/// );
/// let engine = BackupEngine::new(std::env::temp_dir());
/// let outcomes = engine.run_all(&[target])?;
/// assert!(matches!(outcomes[0].status, TargetStatus::BackedUp { .. }));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct BackupEngine<R = DefaultResolver> {
    tmp_dir: PathBuf,
    resolver: R,
}

impl BackupEngine<DefaultResolver> {
    /// Engine using the production backends
    pub fn new<P: Into<PathBuf>>(tmp_dir: P) -> Self {
        Self::with_resolver(tmp_dir, DefaultResolver)
    }
}

impl<R: BackendResolver> BackupEngine<R> {
    pub fn with_resolver<P: Into<PathBuf>>(tmp_dir: P, resolver: R) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
            resolver,
        }
    }

    /// Back up every target, stamping all snapshots with the current local time
    pub fn run_all(&self, targets: &[BackupTarget]) -> Result<Vec<TargetOutcome>> {
        self.run_all_at(targets, &chrono::Local::now().naive_local())
    }

    /// Back up every target, stamping all snapshots with `now`
    pub fn run_all_at(
        &self,
        targets: &[BackupTarget],
        now: &NaiveDateTime,
    ) -> Result<Vec<TargetOutcome>> {
        let mut outcomes = Vec::with_capacity(targets.len());

        for (index, target) in targets.iter().enumerate() {
            let Some(source) = target.source() else {
                debug!(index, "Skipping backup entry without path");
                outcomes.push(TargetOutcome::skipped(index));
                continue;
            };

            let status = match self.backup_target(source, target, now) {
                Ok((snapshot, bytes)) => TargetStatus::BackedUp { snapshot, bytes },
                Err(e) if e.is_fatal() => {
                    error!(index, path = %source.display(), error = %e, "Backup run aborted");
                    record_target_failure();
                    return Err(e);
                }
                Err(e) => {
                    error!(index, path = %source.display(), error = %e, "Backup failed");
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

    fn backup_target(
        &self,
        source: &Path,
        target: &BackupTarget,
        now: &NaiveDateTime,
    ) -> Result<(String, u64)> {
        let destination = target.destination()?;
        let exclusions = ExclusionMatcher::new(&target.exclusion_patterns)?;
        let backend = self
            .resolver
            .resolve(&destination, &target.destination_options)?;

        info!(
            path = %source.display(),
            destination = %destination,
            backend = destination.kind(),
            "Start backup"
        );

        let key = snapshot_name(destination.key_prefix(), now);
        let archive = temp_archive(&self.tmp_dir, &key)?;

        let summary = create_archive(source, &exclusions, &archive)?;
        backend.put(&archive, &key)?;
        record_snapshot_created(summary.bytes);

        info!(path = %source.display(), snapshot = %key, "Done backup");
        Ok((key, summary.bytes))
    }
}
