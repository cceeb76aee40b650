/*!
Per-target results of a backup or restore run.
*/

use std::fmt;
use std::path::PathBuf;

/// What happened to one configured target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetStatus {
    /// The entry has no source path
    Skipped,
    /// A snapshot was stored under `snapshot`
    BackedUp { snapshot: String, bytes: u64 },
    /// The snapshot `snapshot` was extracted into the source path
    Restored { snapshot: String },
    /// The destination holds no snapshot yet
    NoSnapshot,
    /// The target failed without aborting the run
    Failed { error: String },
}

/// Result for the target at `index` in the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub index: usize,
    pub source: Option<PathBuf>,
    pub status: TargetStatus,
}

impl TargetOutcome {
    pub fn new(index: usize, source: Option<PathBuf>, status: TargetStatus) -> Self {
        Self {
            index,
            source,
            status,
        }
    }

    pub fn skipped(index: usize) -> Self {
        Self::new(index, None, TargetStatus::Skipped)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, TargetStatus::Failed { .. })
    }
}

impl fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "target {} ({}): ", self.index, source.display())?,
            None => write!(f, "target {}: ", self.index)?,
        }
        match &self.status {
            TargetStatus::Skipped => write!(f, "skipped, no path"),
            TargetStatus::BackedUp { snapshot, bytes } => {
                write!(f, "backed up to {snapshot} ({bytes} bytes)")
            }
            TargetStatus::Restored { snapshot } => write!(f, "restored from {snapshot}"),
            TargetStatus::NoSnapshot => write!(f, "no snapshot to restore"),
            TargetStatus::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Number of failed targets in a run
pub fn failure_count(outcomes: &[TargetOutcome]) -> usize {
    outcomes.iter().filter(|o| o.is_failure()).count()
}
