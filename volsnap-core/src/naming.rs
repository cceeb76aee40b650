/*!
Snapshot identifiers.

A snapshot is named `<base>-YYYYMMDD-HHMMSS.tar.gz`. The timestamp fields are
zero-padded and fixed-width, so for one base the lexicographic order of names
is the order in which the snapshots were taken; the newest snapshot is the
greatest name.
*/

use chrono::NaiveDateTime;

/// Extension of every snapshot archive
pub const SNAPSHOT_EXTENSION: &str = ".tar.gz";

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Name of the snapshot of `base` taken at local time `now`
pub fn snapshot_name(base: &str, now: &NaiveDateTime) -> String {
    format!("{base}-{}{SNAPSHOT_EXTENSION}", now.format(TIMESTAMP_FORMAT))
}

/// Last path segment of a snapshot key, used to name the local temp archive
pub fn archive_file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Pick the newest snapshot among `names`
pub fn newest<S: AsRef<str>>(names: &[S]) -> Option<&str> {
    names.iter().map(AsRef::as_ref).max()
}
