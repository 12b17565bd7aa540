//! Error types for clustercompare-render

use miette::Diagnostic;
use thiserror::Error;

/// Result type for clustercompare-render operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// A single template execution failure, carrying enough context for a
/// fancy `miette` diagnostic.
#[derive(Debug, Error, Diagnostic)]
#[error("template error in '{template}': {message}")]
pub struct TemplateError {
    pub template: String,
    pub message: String,
    #[help]
    pub help: Option<String>,
}

impl TemplateError {
    pub fn from_minijinja(template: &str, err: &minijinja::Error) -> Self {
        let help = match err.kind() {
            minijinja::ErrorKind::UndefinedError => Some(
                "the reference bundle may be missing a value this template expects; \
                 check for a typo in the field path"
                    .to_string(),
            ),
            minijinja::ErrorKind::InvalidOperation => {
                Some("check the filter/function arguments for a type mismatch".to_string())
            }
            _ => None,
        };
        Self {
            template: template.to_string(),
            message: err.to_string(),
            help,
        }
    }
}

/// Errors that can occur during Jinja rendering or helper execution.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum EngineError {
    /// Template execution failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    /// Rendered bytes failed to YAML-decode.
    #[error("rendered template '{template}' did not decode as YAML: {source}\n--- rendered output ---\n{rendered}")]
    RenderedYamlInvalid {
        template: String,
        rendered: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Rendered metadata for a template is missing a `kind`.
    #[error("template '{0}' rendered metadata has no 'kind'")]
    MissingKind(String),

    /// Filter/function-level failure not tied to a specific template.
    #[error("filter error: {0}")]
    Filter(String),

    /// I/O failure loading a template-function file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped minijinja environment-setup error.
    #[error("minijinja error: {0}")]
    MiniJinja(#[from] minijinja::Error),
}
