//! Error types for the sync and runner components

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while syncing files with the object store
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload to {uri} failed: {cause}")]
    UploadError { uri: String, cause: String },

    #[error("download of {uri} failed: {cause}")]
    DownloadError { uri: String, cause: String },
}

/// Errors raised by the stack task runner
#[derive(Error, Debug)]
pub enum TaskError {
    /// The environment's variable file is absent. Not retryable.
    #[error("tfvars not found: {0}. Run `stackrun sync-tfvars <env>` first.")]
    MissingConfiguration(PathBuf),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("command `{command}` failed with exit code {code}")]
    ProcessFailure { command: String, code: i32 },

    #[error("command `{command}` timed out after {limit:?}")]
    Timeout { command: String, limit: Duration },

    #[error("stack pipeline panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
