/*!
# Volsnap Core

Directory snapshot and restore engine for volumes that must survive the
host they run on.

Each configured backup target pairs a local directory with a destination
URI. A backup archives the directory into a gzip-compressed tar, names it
`<base>-YYYYMMDD-HHMMSS.tar.gz` and stores it in an S3 bucket or a local
directory. A restore picks the newest snapshot under the same base and
extracts it back over the directory.

- [`BackupEngine`] and [`RestoreEngine`] run every target of a [`Config`]
- [`StorageBackend`] abstracts the destinations; [`BackendResolver`] picks one
- [`ExclusionMatcher`] leaves paths out of an archive by regular expression
- [`observability`] sets up logging and Prometheus metrics

## Usage

```rust,no_run
use volsnap_core::{BackupEngine, Config, RestoreEngine};

let config = Config::load("/etc/volsnap/config.json")?;
config.validate()?;

RestoreEngine::new(&config.tmp).run_all(&config.backups)?;
// ... the application runs and writes to its volumes ...
for outcome in BackupEngine::new(&config.tmp).run_all(&config.backups)? {
    println!("{outcome}");
}
# Ok::<(), volsnap_core::VolsnapError>(())
```
*/

pub mod archive;
pub mod backup;
pub mod config;
pub mod destination;
pub mod error;
pub mod exclude;
pub mod naming;
pub mod observability;
pub mod outcome;
pub mod restore;
pub mod storage;

#[cfg(test)]
mod error_tests;
#[cfg(test)]
mod test_support;

pub use archive::{create_archive, extract_archive, ArchiveSummary};
pub use backup::BackupEngine;
pub use config::{BackupTarget, Config};
pub use destination::Destination;
pub use error::{Result, VolsnapError};
pub use exclude::ExclusionMatcher;
pub use naming::snapshot_name;
pub use outcome::{failure_count, TargetOutcome, TargetStatus};
pub use restore::RestoreEngine;
pub use storage::{
    BackendResolver, DefaultResolver, DestinationOptions, LocalFileStorage, StorageBackend,
};

#[cfg(feature = "s3")]
pub use storage::S3StorageAdapter;
