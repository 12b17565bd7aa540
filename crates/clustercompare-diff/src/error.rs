//! Error types for clustercompare-diff.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiffCrateError>;

/// A cluster resource that no correlator could place, or that more than
/// one claimed with equal specificity.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CorrelateError {
    #[error("no correlator matched CR '{cr}'")]
    UnknownMatch { cr: String },

    #[error("CR '{cr}' matched multiple templates: {templates}")]
    MultipleMatches { cr: String, templates: String },
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InlineDiffError {
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("capturegroup name '{name}' is not a valid identifier")]
    InvalidCapturegroupName { name: String },
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OverrideError {
    #[error("override for template '{template}' is missing a reason")]
    MissingReason { template: String },

    #[error("rfc6902 patch application failed: {0}")]
    Rfc6902(String),

    #[error("go-template patch failed to render: {0}")]
    GoTemplate(#[from] clustercompare_render::EngineError),

    #[error("strategic-merge patch failed: {0}")]
    StrategicMerge(String),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiffCrateError {
    #[error(transparent)]
    Correlate(#[from] CorrelateError),

    #[error(transparent)]
    InlineDiff(#[from] InlineDiffError),

    #[error(transparent)]
    Override(#[from] OverrideError),

    #[error("external diff process failed: {0}")]
    DiffProcess(String),

    #[error(transparent)]
    Core(#[from] clustercompare_core::CoreError),

    #[error(transparent)]
    Render(#[from] clustercompare_render::EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
