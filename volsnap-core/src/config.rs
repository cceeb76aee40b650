//! Configuration model for backup targets
//!
//! The configuration is a JSON document loaded once at process start:
//!
//! ```json
//! {
//!   "tmp": "/var/tmp",
//!   "backups": [
//!     {
//!       "path": "/data/app",
//!       "dest": "s3://my-bucket/backups/app",
//!       "exclude": ["\\.log$", "^cache/"],
//!       "s3": { "StorageClass": "STANDARD_IA" },
//!       "chmod": "0755",
//!       "chown": "app:app"
//!     }
//!   ]
//! }
//! ```
//!
//! Entries without `path` are kept but skipped by both engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::destination::Destination;
use crate::exclude::ExclusionMatcher;
use crate::{Result, VolsnapError};

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for temporary archives
    #[serde(default = "default_tmp")]
    pub tmp: PathBuf,
    /// Targets in the order they are processed
    #[serde(default)]
    pub backups: Vec<BackupTarget>,
}

/// One directory to back up and restore
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupTarget {
    /// Directory to snapshot; targets without it are skipped
    #[serde(
        rename = "path",
        alias = "source_path",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_path: Option<PathBuf>,
    /// Destination URI, see [`Destination`]
    #[serde(
        rename = "dest",
        alias = "destination",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub destination: Option<String>,
    /// Regular expressions searched in each entry's relative path
    #[serde(rename = "exclude", alias = "exclusion_patterns", default)]
    pub exclusion_patterns: Vec<String>,
    /// Backend-specific upload options, e.g. `StorageClass`
    #[serde(rename = "s3", alias = "destination_options", default)]
    pub destination_options: BTreeMap<String, String>,
    /// Mode passed to `chmod` on the target directory before restore
    #[serde(
        rename = "chmod",
        alias = "post_restore_chmod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub post_restore_chmod: Option<String>,
    /// Owner passed to `chown` on the target directory before restore
    #[serde(
        rename = "chown",
        alias = "post_restore_chown",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub post_restore_chown: Option<String>,
}

fn default_tmp() -> PathBuf {
    std::env::temp_dir()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tmp: default_tmp(),
            backups: Vec::new(),
        }
    }
}

impl BackupTarget {
    /// Create a target for `source_path` stored at `destination`
    pub fn new<P: Into<PathBuf>, S: Into<String>>(source_path: P, destination: S) -> Self {
        BackupTarget {
            source_path: Some(source_path.into()),
            destination: Some(destination.into()),
            ..Default::default()
        }
    }

    /// Add exclusion patterns
    pub fn with_exclusions<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusion_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// The source directory, or `None` when the entry has no usable path
    pub fn source(&self) -> Option<&Path> {
        self.source_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Parse the destination URI
    pub fn destination(&self) -> Result<Destination> {
        match self.destination.as_deref() {
            Some(uri) if !uri.is_empty() => Destination::parse(uri),
            _ => Err(VolsnapError::configuration(format!(
                "Backup target {} has no destination",
                self.source().map(|p| p.display().to_string()).unwrap_or_default()
            ))),
        }
    }
}

impl Config {
    /// Parse a configuration document
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        debug!(targets = config.backups.len(), tmp = %config.tmp.display(), "Parsed configuration");
        Ok(config)
    }

    /// Load the configuration from a path or a `file://`, `s3://` or `http(s)://` URI
    pub fn load(location: &str) -> Result<Self> {
        if let Some(path) = location.strip_prefix("file://") {
            return Self::from_json(&std::fs::read_to_string(path)?);
        }
        if let Some(rest) = location.strip_prefix("s3://") {
            return Self::from_json(&load_from_object_store(rest)?);
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            return Self::from_json(&load_from_url(location)?);
        }
        if location.contains("://") {
            return Err(VolsnapError::UnsupportedScheme(location.to_string()));
        }
        Self::from_json(&std::fs::read_to_string(location)?)
    }

    /// Check every active target's destination and exclusion patterns
    pub fn validate(&self) -> Result<()> {
        for target in self.backups.iter().filter(|t| t.source().is_some()) {
            target.destination()?;
            ExclusionMatcher::new(&target.exclusion_patterns)?;
        }
        Ok(())
    }
}

#[cfg(feature = "s3")]
fn load_from_object_store(bucket_and_key: &str) -> Result<String> {
    let (bucket, key) = bucket_and_key.split_once('/').ok_or_else(|| {
        VolsnapError::configuration(format!("Invalid configuration URI s3://{bucket_and_key}"))
    })?;
    let adapter = crate::storage::S3StorageAdapter::new(bucket.to_string(), BTreeMap::new())?;
    let bytes = adapter.read_object(key)?;
    String::from_utf8(bytes)
        .map_err(|e| VolsnapError::configuration(format!("Configuration is not UTF-8: {e}")))
}

#[cfg(not(feature = "s3"))]
fn load_from_object_store(bucket_and_key: &str) -> Result<String> {
    Err(VolsnapError::configuration(format!(
        "Cannot load s3://{bucket_and_key}: built without the `s3` feature"
    )))
}

#[cfg(feature = "http")]
fn load_from_url(url: &str) -> Result<String> {
    debug!(url, "Fetching configuration");
    let result: Result<String> = crate::storage::runtime().block_on(async {
        let client = reqwest::Client::builder()
            .user_agent(format!("volsnap/{}", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| VolsnapError::configuration(format!("Failed to build HTTP client: {e}")))?;
        let response = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VolsnapError::configuration(format!("Failed to fetch {url}: {e}")))?;
        response
            .text()
            .await
            .map_err(|e| VolsnapError::configuration(format!("Failed to read {url}: {e}")))
    });
    result
}

#[cfg(not(feature = "http"))]
fn load_from_url(url: &str) -> Result<String> {
    Err(VolsnapError::configuration(format!(
        "Cannot load {url}: built without the `http` feature"
    )))
}
