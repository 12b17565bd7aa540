//! Error types for clustercompare-fetch.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchError>;

/// A reference bundle could not be resolved to a local directory
/// (§7 "FetchError" — fatal at CLI invocation).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("local reference path does not exist: {path}")]
    LocalPathMissing { path: String },

    #[error("HTTP fetch of '{url}' failed after {attempts} attempts: {reason}")]
    HttpExhausted { url: String, attempts: u32, reason: String },

    #[error("malformed reference source '{source}': {reason}")]
    MalformedSource { source: String, reason: String },

    #[error("OCI pull of '{reference}' failed: {message}")]
    OciPullFailed { reference: String, message: String },

    #[error("OCI image does not contain path '{path}'")]
    OciPathMissing { path: String },

    #[error("archive extraction failed: {0}")]
    Archive(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
