/*!
Destination URIs for snapshot storage.

A destination names both the backend kind and the snapshot base inside it:

- `s3://bucket/path/app` stores objects `path/app-<timestamp>.tar.gz` in `bucket`
- `file://backups/app` stores files `backups/app-<timestamp>.tar.gz`
- `file:///srv/backups/app` stores files `/srv/backups/app-<timestamp>.tar.gz`

`object-store://` and `local-file://` are accepted as aliases of `s3://` and
`file://`. Any other scheme is rejected with [`VolsnapError::UnsupportedScheme`].
*/

use std::fmt;
use std::path::PathBuf;

use crate::{Result, VolsnapError};

/// Storage location of one target's snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Remote bucket-style storage
    ObjectStore {
        bucket: String,
        key_prefix: String,
    },
    /// Directory on local disk or a network mount
    LocalFilesystem {
        /// Directory the keys are relative to; `None` when the key is absolute
        base_dir: Option<PathBuf>,
        key_prefix: String,
    },
}

impl Destination {
    /// Parse a destination URI
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| VolsnapError::UnsupportedScheme(uri.to_string()))?;

        match scheme.to_ascii_lowercase().as_str() {
            "s3" | "object-store" => {
                let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(VolsnapError::configuration(format!(
                        "Invalid destination {uri}: missing bucket name"
                    )));
                }
                Ok(Destination::ObjectStore {
                    bucket: bucket.to_string(),
                    key_prefix: validate_key_prefix(uri, key)?,
                })
            }
            "file" | "local-file" => {
                if rest.starts_with('/') {
                    return Ok(Destination::LocalFilesystem {
                        base_dir: None,
                        key_prefix: validate_key_prefix(uri, rest)?,
                    });
                }
                let (base, key) = rest.split_once('/').unwrap_or((rest, ""));
                Ok(Destination::LocalFilesystem {
                    base_dir: Some(PathBuf::from(base)),
                    key_prefix: validate_key_prefix(uri, key)?,
                })
            }
            _ => Err(VolsnapError::UnsupportedScheme(uri.to_string())),
        }
    }

    /// Key prefix that every snapshot of this destination starts with
    pub fn key_prefix(&self) -> &str {
        match self {
            Destination::ObjectStore { key_prefix, .. } => key_prefix,
            Destination::LocalFilesystem { key_prefix, .. } => key_prefix,
        }
    }

    /// Short label of the backend kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Destination::ObjectStore { .. } => "object-store",
            Destination::LocalFilesystem { .. } => "local-file",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::ObjectStore { bucket, key_prefix } => {
                write!(f, "s3://{bucket}/{key_prefix}")
            }
            Destination::LocalFilesystem {
                base_dir: Some(base),
                key_prefix,
            } => write!(f, "file://{}/{key_prefix}", base.display()),
            Destination::LocalFilesystem {
                base_dir: None,
                key_prefix,
            } => write!(f, "file://{key_prefix}"),
        }
    }
}

fn validate_key_prefix(uri: &str, key: &str) -> Result<String> {
    if key.is_empty() || key.ends_with('/') {
        return Err(VolsnapError::configuration(format!(
            "Invalid destination {uri}: expected a snapshot base name after the location"
        )));
    }
    Ok(key.to_string())
}
