//! Error types for clustercompare-loader.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoaderError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoaderError {
    #[error("unsupported apiVersion '{0}': expected a v1 or v2 metadata dialect")]
    UnsupportedApiVersion(String),

    #[error("component '{component}' has no templates (no cardinality key set)")]
    NoCardinalityKey { component: String },

    #[error("component '{component}' has more than one cardinality key set: {keys}")]
    MultipleCardinalityKeys { component: String, keys: String },

    #[error("template '{path}' referenced by the reference but not found under '{root}'")]
    TemplateFileMissing { path: String, root: String },

    #[error("reference has zero parts")]
    EmptyReference,

    #[error(transparent)]
    Core(#[from] clustercompare_core::CoreError),

    #[error(transparent)]
    Render(#[from] clustercompare_render::EngineError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
