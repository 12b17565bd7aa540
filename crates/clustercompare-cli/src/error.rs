//! CLI-level error type: wraps every collaborator crate's error and
//! maps it to a process exit code (§7).

use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum CliError {
    #[error("could not resolve reference bundle: {0}")]
    #[diagnostic(code(clustercompare::fetch))]
    Fetch(#[from] clustercompare_fetch::FetchError),

    #[error("could not load reference bundle: {0}")]
    #[diagnostic(code(clustercompare::load))]
    Load(#[from] clustercompare_loader::LoaderError),

    #[error("comparison failed: {0}")]
    #[diagnostic(code(clustercompare::diff))]
    Diff(#[from] clustercompare_diff::DiffCrateError),

    #[error("{0}")]
    #[diagnostic(code(clustercompare::core))]
    Core(#[from] clustercompare_core::CoreError),

    #[error("could not reach the cluster: {0}")]
    #[diagnostic(code(clustercompare::cluster))]
    Cluster(#[from] kube::Error),

    #[error("invalid input: {message}")]
    #[diagnostic(code(clustercompare::usage))]
    Usage { message: String },

    #[error("I/O error: {0}")]
    #[diagnostic(code(clustercompare::io))]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    #[diagnostic(code(clustercompare::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage { message: message.into() }
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Fetch(_) => exit_codes::FETCH_ERROR,
            CliError::Load(_) => exit_codes::LOAD_ERROR,
            CliError::Diff(clustercompare_diff::DiffCrateError::Override(_)) => exit_codes::OVERRIDE_ERROR,
            CliError::Diff(_) => exit_codes::DIFF_ERROR,
            CliError::Core(_) => exit_codes::LOAD_ERROR,
            CliError::Cluster(_) => exit_codes::CLUSTER_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Io(_) => exit_codes::IO_ERROR,
            CliError::Yaml(_) => exit_codes::LOAD_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
