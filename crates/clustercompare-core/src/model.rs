//! Shared data model (§3): Reference, Part, Component, Template, CR,
//! DiffSum, Summary.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};
use crate::omit::FieldsToOmit;
use crate::path::Path;

/// Which metadata dialect a reference bundle was written against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceVersion {
    V1,
    V2,
}

/// A cardinality group constraining how many of a Component's templates
/// may or must match (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneOf,
    NoneOf,
    AllOf,
    AnyOf,
    AnyOneOf,
    AllOrNoneOf,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::OneOf => "oneOf",
            Cardinality::NoneOf => "noneOf",
            Cardinality::AllOf => "allOf",
            Cardinality::AnyOf => "anyOf",
            Cardinality::AnyOneOf => "anyOneOf",
            Cardinality::AllOrNoneOf => "allOrNoneOf",
        }
    }
}

/// Which inline-diff strategy applies to a `perField` entry (§4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InlineDiffFunc {
    Regex,
    Capturegroups,
}

/// A single `config.perField` entry on a v2 template.
#[derive(Debug, Clone)]
pub struct PerFieldConfig {
    pub path_to_key: Path,
    pub inline_diff_func: InlineDiffFunc,
}

/// Per-template configuration (§3 TemplateConfig).
#[derive(Debug, Clone, Default)]
pub struct TemplateConfig {
    pub allow_merge: bool,
    pub fields_to_omit_refs: Vec<String>,
    pub per_field: Vec<PerFieldConfig>,
}

/// A single reference template: its source, config, and (once computed)
/// its rendered-empty metadata.
#[derive(Debug, Clone)]
pub struct Template {
    /// The path within the bundle; also the template's identifier.
    pub path: String,
    pub description: Option<String>,
    pub source: String,
    pub config: TemplateConfig,
    /// Populated by the loader after the empty-parameter render pass.
    pub metadata: Option<JsonValue>,
}

impl Template {
    pub fn kind(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.get("kind")).and_then(|v| v.as_str())
    }

    pub fn effective_omit_refs(&self, default_ref: &str) -> Vec<String> {
        if self.config.fields_to_omit_refs.is_empty() {
            vec![default_ref.to_string()]
        } else {
            self.config.fields_to_omit_refs.clone()
        }
    }
}

/// A Component: exactly one cardinality group, one or more templates.
#[derive(Debug, Clone)]
pub struct Component {
    pub name: String,
    pub description: Option<String>,
    pub cardinality: Cardinality,
    pub templates: Vec<Template>,
}

/// A Part: a named, ordered group of Components.
#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    pub description: Option<String>,
    pub components: Vec<Component>,
}

/// The fully loaded, immutable Reference (§3).
#[derive(Debug, Clone)]
pub struct Reference {
    pub version: ReferenceVersion,
    pub parts: Vec<Part>,
    pub template_function_files: Vec<String>,
    pub fields_to_omit: FieldsToOmit,
}

impl Reference {
    /// Iterate every template across every part/component, in
    /// declaration order.
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.parts.iter().flat_map(|p| p.components.iter()).flat_map(|c| c.templates.iter())
    }

    pub fn find_template(&self, path: &str) -> Option<&Template> {
        self.templates().find(|t| t.path == path)
    }
}

/// A concrete, deserialised cluster resource (§3 CR).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResource {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(skip)]
    pub name: String,
    #[serde(skip)]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub raw: JsonValue,
}

impl ClusterResource {
    /// Parse a resource from a JSON/YAML-decoded value, requiring
    /// `apiVersion`, `kind`, and `metadata.name`.
    pub fn from_value(raw: JsonValue) -> Result<Self> {
        let api_version = raw
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::MalformedPath {
                path: "apiVersion".to_string(),
                reason: "missing required field".to_string(),
            })?
            .to_string();
        let kind = raw
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::MalformedPath {
                path: "kind".to_string(),
                reason: "missing required field".to_string(),
            })?
            .to_string();
        let name = raw
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::MalformedPath {
                path: "metadata.name".to_string(),
                reason: "missing required field".to_string(),
            })?
            .to_string();
        let namespace = raw
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Self {
            api_version,
            kind,
            name,
            namespace,
            raw,
        })
    }

    /// The manual-correlation identifier: `apiVersion_kind_[namespace_]name`.
    pub fn correlation_id(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}_{}_{}_{}", self.api_version, self.kind, ns, self.name),
            None => format!("{}_{}_{}", self.api_version, self.kind, self.name),
        }
    }

    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{} ({}/{})", self.kind, self.name, ns, self.api_version),
            None => format!("{}/{} ({})", self.kind, self.name, self.api_version),
        }
    }
}

/// The outcome of comparing one CR to its correlated template (§3 DiffSum).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffSum {
    pub cr_name: String,
    pub correlated_template: Option<String>,
    pub diff_output: String,
    #[serde(default)]
    pub patched: bool,
    #[serde(default)]
    pub override_reasons: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Inline-diff capturegroup conflict warnings (§4.C), surfaced
    /// alongside the textual diff rather than failing the comparison.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl DiffSum {
    pub fn is_empty_diff(&self) -> bool {
        self.diff_output.is_empty()
    }
}

/// One validation issue raised by cardinality checking (§4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub msg: String,
    pub crs: Vec<String>,
    #[serde(default)]
    pub cr_metadata: Option<JsonValue>,
}

/// The end-of-run comparison summary (§3 Summary).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Summary {
    pub validation_issues: IndexMap<String, IndexMap<String, ValidationIssue>>,
    pub num_missing: usize,
    pub unmatched_crs: Vec<String>,
    pub num_diff_crs: usize,
    pub total_crs: usize,
    pub patched_crs: usize,
    pub metadata_hash: String,
}
