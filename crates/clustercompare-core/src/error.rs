//! Error types for clustercompare-core

use thiserror::Error;

/// Result type for clustercompare-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors from the path accessor, field-omitter, and data model layers
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Attempted to index into (or key) a scalar value
    #[error("cannot traverse into scalar value at '{path}'")]
    BadAccessor { path: String },

    /// A list index segment did not parse as an integer
    #[error("invalid list index '{segment}' in path '{path}'")]
    InvalidIndex { path: String, segment: String },

    /// List index out of bounds
    #[error("list index {index} out of bounds (len {len}) in path '{path}'")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    /// A dotted path string failed to parse (unterminated quote, etc.)
    #[error("malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    /// `fieldsToOmit` referenced a set name that does not exist
    #[error("fieldsToOmit set '{name}' is not defined")]
    UnknownOmitSet { name: String },

    /// A cycle was found while resolving `include` references
    #[error("circular import found {chain}")]
    CyclicInclude { chain: String },

    /// YAML parse/decode failure
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parse/decode failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure while reading a bundle file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
