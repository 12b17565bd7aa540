//! Raw, serde-level shapes for the two supported metadata dialects
//! (§4.D). These are intentionally permissive; validation into the
//! strict [`clustercompare_core::model`] types happens in [`crate::load`].

use clustercompare_core::{FieldsToOmit, InlineDiffFunc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RawPerField {
    #[serde(rename = "pathToKey")]
    pub path_to_key: String,
    #[serde(rename = "inlineDiffFunc")]
    pub inline_diff_func: InlineDiffFunc,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTemplateConfig {
    #[serde(rename = "allowMerge", default)]
    pub allow_merge: bool,
    #[serde(rename = "fieldsToOmitRefs", default)]
    pub fields_to_omit_refs: Vec<String>,
    #[serde(rename = "perField", default)]
    pub per_field: Vec<RawPerField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTemplate {
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: RawTemplateConfig,
}

/// A v2 component: exactly one of these six fields must be `Some`.
#[derive(Debug, Deserialize)]
pub struct RawComponentV2 {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "oneOf", default)]
    pub one_of: Option<Vec<RawTemplate>>,
    #[serde(rename = "noneOf", default)]
    pub none_of: Option<Vec<RawTemplate>>,
    #[serde(rename = "allOf", default)]
    pub all_of: Option<Vec<RawTemplate>>,
    #[serde(rename = "anyOf", default)]
    pub any_of: Option<Vec<RawTemplate>>,
    #[serde(rename = "anyOneOf", default)]
    pub any_one_of: Option<Vec<RawTemplate>>,
    #[serde(rename = "allOrNoneOf", default)]
    pub all_or_none_of: Option<Vec<RawTemplate>>,
}

#[derive(Debug, Deserialize)]
pub struct RawPartV2 {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub components: Vec<RawComponentV2>,
}

#[derive(Debug, Deserialize)]
pub struct RawReferenceV2 {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub parts: Vec<RawPartV2>,
    #[serde(rename = "templateFunctionFiles", default)]
    pub template_function_files: Vec<String>,
    #[serde(rename = "fieldsToOmit", default)]
    pub fields_to_omit: FieldsToOmit,
}

/// v1 legacy component: a `type` tag plus up to two template lists. Kept
/// deliberately separate from the v2 shape — see the loader's handling
/// of the partial `optionalTemplates`-inside-`Required` redundancy.
#[derive(Debug, Deserialize)]
pub struct RawComponentV1 {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: RawComponentKindV1,
    #[serde(rename = "requiredTemplates", default)]
    pub required_templates: Vec<RawTemplate>,
    #[serde(rename = "optionalTemplates", default)]
    pub optional_templates: Vec<RawTemplate>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub enum RawComponentKindV1 {
    Required,
    Optional,
}

#[derive(Debug, Deserialize)]
pub struct RawPartV1 {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub components: Vec<RawComponentV1>,
}

#[derive(Debug, Deserialize)]
pub struct RawReferenceV1 {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub parts: Vec<RawPartV1>,
    #[serde(rename = "templateFunctionFiles", default)]
    pub template_function_files: Vec<String>,
    #[serde(rename = "fieldsToOmit", default)]
    pub fields_to_omit: FieldsToOmit,
}

/// Discriminate dialects purely on `apiVersion`, without committing to
/// either shape.
#[derive(Debug, Deserialize)]
pub struct ApiVersionProbe {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
}
