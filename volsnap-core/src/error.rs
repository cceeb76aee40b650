/*!
Error types for the volsnap backup/restore engine.
*/

use thiserror::Error;

/// Result type used throughout volsnap core.
pub type Result<T> = std::result::Result<T, VolsnapError>;

/// Errors that can occur during backup and restore runs.
#[derive(Error, Debug)]
pub enum VolsnapError {
    /// I/O errors during local file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors while reading configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Destination URI with a scheme no backend handles
    #[error("Not supported scheme: {0}")]
    UnsupportedScheme(String),

    /// Exclusion pattern that does not compile
    #[error("Invalid exclusion pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Archive creation or extraction errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Copy to or from a local/mounted destination failed
    #[error("Local storage error: {0}")]
    LocalStorage(String),

    /// Remote object store errors (network, auth, quota)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl VolsnapError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new archive error
    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a new local storage error
    pub fn local_storage<S: Into<String>>(msg: S) -> Self {
        Self::LocalStorage(msg.into())
    }

    /// Create a new remote storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether this error aborts the whole engine run instead of failing one target.
    ///
    /// Configuration problems and remote storage errors propagate out of
    /// `run_all`; local I/O and archive problems only fail the target they
    /// occurred on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::UnsupportedScheme(_)
                | Self::InvalidPattern { .. }
                | Self::Storage(_)
        )
    }
}
