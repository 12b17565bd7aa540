//! Correlator chain (§4.F): maps a cluster resource to the one template
//! it should be compared against.

use std::collections::HashMap;
use std::sync::Mutex;

use clustercompare_core::{ClusterResource, Reference};
use serde_json::Value as JsonValue;

use crate::error::CorrelateError;

/// The field-group descriptors, in decreasing specificity (§4.F).
const FIELD_GROUPS: &[&[&str]] = &[
    &["apiVersion", "name", "namespace", "kind"],
    &["apiVersion", "namespace", "kind"],
    &["name", "namespace", "kind"],
    &["apiVersion", "name", "kind"],
    &["name", "kind"],
    &["namespace", "kind"],
    &["apiVersion", "kind"],
    &["kind"],
];

fn cr_field(cr: &ClusterResource, field: &str) -> Option<String> {
    match field {
        "apiVersion" => Some(cr.api_version.clone()),
        "kind" => Some(cr.kind.clone()),
        "name" => Some(cr.name.clone()),
        "namespace" => cr.namespace.clone(),
        _ => None,
    }
}

fn metadata_field(metadata: &JsonValue, field: &str) -> Option<String> {
    let value = match field {
        "apiVersion" => metadata.get("apiVersion"),
        "kind" => metadata.get("kind"),
        "name" => metadata.pointer("/metadata/name"),
        "namespace" => metadata.pointer("/metadata/namespace"),
        _ => None,
    }?;
    value.as_str().filter(|s| !s.is_empty()).map(|s| s.to_string())
}

fn group_key(fields: &[Option<String>]) -> Option<String> {
    if fields.iter().any(Option::is_none) {
        return None;
    }
    Some(fields.iter().map(|f| f.as_deref().unwrap()).collect::<Vec<_>>().join("\u{0}"))
}

/// Outcome of a single correlator attempt.
#[derive(Debug, Clone)]
pub enum CorrelateOutcome {
    /// One or more candidate templates claim this CR; the driver picks
    /// the best-of-N.
    Matched(Vec<String>),
    Unknown,
}

/// Exact-pair correlator: a user-supplied mapping of
/// `apiVersion_kind_[namespace_]name` → template path (§6 "User config").
#[derive(Debug, Default, Clone)]
pub struct ExactPairCorrelator {
    pairs: HashMap<String, String>,
}

impl ExactPairCorrelator {
    #[must_use]
    pub fn new(pairs: HashMap<String, String>) -> Self {
        Self { pairs }
    }

    #[must_use]
    pub fn correlate(&self, cr: &ClusterResource) -> CorrelateOutcome {
        match self.pairs.get(&cr.correlation_id()) {
            Some(path) => CorrelateOutcome::Matched(vec![path.clone()]),
            None => CorrelateOutcome::Unknown,
        }
    }
}

/// Field-group correlator: indexes every template by the most-specific
/// group descriptor its rendered metadata satisfies, then at lookup time
/// walks groups from most to least specific for the CR.
#[derive(Debug, Default)]
pub struct FieldGroupCorrelator {
    /// `group index -> (key -> template paths)`.
    index: Vec<HashMap<String, Vec<String>>>,
}

impl FieldGroupCorrelator {
    #[must_use]
    pub fn from_reference(reference: &Reference) -> Self {
        let mut index: Vec<HashMap<String, Vec<String>>> = vec![HashMap::new(); FIELD_GROUPS.len()];

        for template in reference.templates() {
            let Some(metadata) = &template.metadata else { continue };
            for (group_idx, group) in FIELD_GROUPS.iter().enumerate() {
                let fields: Vec<Option<String>> = group.iter().map(|f| metadata_field(metadata, f)).collect();
                if let Some(key) = group_key(&fields) {
                    index[group_idx].entry(key).or_default().push(template.path.clone());
                    break;
                }
            }
        }

        Self { index }
    }

    #[must_use]
    pub fn correlate(&self, cr: &ClusterResource) -> CorrelateOutcome {
        for (group_idx, group) in FIELD_GROUPS.iter().enumerate() {
            let fields: Vec<Option<String>> = group.iter().map(|f| cr_field(cr, f)).collect();
            let Some(key) = group_key(&fields) else { continue };
            if let Some(templates) = self.index[group_idx].get(&key) {
                if !templates.is_empty() {
                    return CorrelateOutcome::Matched(templates.clone());
                }
            }
        }
        CorrelateOutcome::Unknown
    }
}

/// A correlator, represented as a tagged variant so `Chain` and `Metrics`
/// can wrap arbitrary sub-correlators without dynamic dispatch.
pub enum Correlator {
    ExactPair(ExactPairCorrelator),
    FieldGroup(FieldGroupCorrelator),
    Chain(Vec<Correlator>),
    Metrics(Box<Correlator>, Metrics),
}

impl Correlator {
    #[must_use]
    pub fn correlate(&self, cr: &ClusterResource) -> CorrelateOutcome {
        match self {
            Correlator::ExactPair(c) => c.correlate(cr),
            Correlator::FieldGroup(c) => c.correlate(cr),
            Correlator::Chain(chain) => {
                for sub in chain {
                    match sub.correlate(cr) {
                        CorrelateOutcome::Matched(templates) => return CorrelateOutcome::Matched(templates),
                        CorrelateOutcome::Unknown => continue,
                    }
                }
                CorrelateOutcome::Unknown
            }
            Correlator::Metrics(inner, metrics) => {
                let outcome = inner.correlate(cr);
                match &outcome {
                    CorrelateOutcome::Matched(templates) => {
                        if let Some(first) = templates.first() {
                            metrics.record_match(first);
                        }
                    }
                    CorrelateOutcome::Unknown => metrics.record_unmatched(&cr.correlation_id()),
                }
                outcome
            }
        }
    }

    /// Resolve a `Matched` outcome (or record the appropriate error) per
    /// the driver's `UnknownMatch`/`MultipleMatches` policy, given a
    /// `pick_best` function that breaks ties among multiple candidates.
    pub fn resolve(
        &self,
        cr: &ClusterResource,
        pick_best: impl FnOnce(&[String]) -> String,
    ) -> std::result::Result<String, CorrelateError> {
        match self.correlate(cr) {
            CorrelateOutcome::Matched(templates) if templates.len() == 1 => Ok(templates.into_iter().next().unwrap()),
            CorrelateOutcome::Matched(templates) => Ok(pick_best(&templates)),
            CorrelateOutcome::Unknown => Err(CorrelateError::UnknownMatch { cr: cr.display_name() }),
        }
    }
}

/// Thread-safe match/unmatch counters, guarded independently (§4.F,
/// §5: "distinct guards for the two collections").
#[derive(Debug, Default)]
pub struct Metrics {
    matched_templates_names: Mutex<HashMap<String, usize>>,
    unmatched_crs: Mutex<Vec<String>>,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_match(&self, template_path: &str) {
        *self.matched_templates_names.lock().unwrap().entry(template_path.to_string()).or_insert(0) += 1;
    }

    pub fn record_unmatched(&self, cr_id: &str) {
        self.unmatched_crs.lock().unwrap().push(cr_id.to_string());
    }

    #[must_use]
    pub fn matched_templates_names(&self) -> HashMap<String, usize> {
        self.matched_templates_names.lock().unwrap().clone()
    }

    #[must_use]
    pub fn unmatched_crs(&self) -> Vec<String> {
        self.unmatched_crs.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustercompare_core::{Cardinality, Component, Part, ReferenceVersion, Template, TemplateConfig};
    use serde_json::json;

    fn cr(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> ClusterResource {
        ClusterResource {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.map(|s| s.to_string()),
            raw: json!({}),
        }
    }

    fn template(path: &str, metadata: JsonValue) -> Template {
        Template {
            path: path.to_string(),
            description: None,
            source: String::new(),
            config: TemplateConfig::default(),
            metadata: Some(metadata),
        }
    }

    fn reference(templates: Vec<Template>) -> Reference {
        Reference {
            version: ReferenceVersion::V2,
            parts: vec![Part {
                name: "part".to_string(),
                description: None,
                components: vec![Component {
                    name: "component".to_string(),
                    description: None,
                    cardinality: Cardinality::AllOf,
                    templates,
                }],
            }],
            template_function_files: Vec::new(),
            fields_to_omit: Default::default(),
        }
    }

    #[test]
    fn specificity_prefers_the_more_specific_group() {
        let reference = reference(vec![template(
            "deploy.yaml",
            json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"namespace": "ns-a", "name": ""}}),
        )]);
        let correlator = FieldGroupCorrelator::from_reference(&reference);
        let target = cr("apps/v1", "Deployment", Some("ns-a"), "anything");
        match correlator.correlate(&target) {
            CorrelateOutcome::Matched(templates) => assert_eq!(templates, vec!["deploy.yaml".to_string()]),
            CorrelateOutcome::Unknown => panic!("expected a match via {{apiVersion, namespace, kind}}"),
        }
    }

    #[test]
    fn unmatched_cr_is_unknown() {
        let reference = reference(vec![template("deploy.yaml", json!({"apiVersion": "v1", "kind": "Pod", "metadata": {}}))]);
        let correlator = FieldGroupCorrelator::from_reference(&reference);
        let target = cr("apps/v1", "Deployment", None, "x");
        assert!(matches!(correlator.correlate(&target), CorrelateOutcome::Unknown));
    }

    #[test]
    fn chain_tries_exact_pair_before_field_group() {
        let mut pairs = HashMap::new();
        pairs.insert("v1_Pod_default_demo".to_string(), "exact.yaml".to_string());
        let exact = Correlator::ExactPair(ExactPairCorrelator::new(pairs));
        let reference = reference(vec![template("fallback.yaml", json!({"apiVersion": "v1", "kind": "Pod", "metadata": {}}))]);
        let field_group = Correlator::FieldGroup(FieldGroupCorrelator::from_reference(&reference));
        let chain = Correlator::Chain(vec![exact, field_group]);

        let target = cr("v1", "Pod", Some("default"), "demo");
        match chain.correlate(&target) {
            CorrelateOutcome::Matched(templates) => assert_eq!(templates, vec!["exact.yaml".to_string()]),
            CorrelateOutcome::Unknown => panic!("expected exact-pair match"),
        }
    }

    #[test]
    fn metrics_tracks_matches_and_unmatched_independently() {
        let reference = reference(vec![template("pod.yaml", json!({"apiVersion": "v1", "kind": "Pod", "metadata": {}}))]);
        let field_group = Correlator::FieldGroup(FieldGroupCorrelator::from_reference(&reference));
        let wrapped = Correlator::Metrics(Box::new(field_group), Metrics::new());

        wrapped.correlate(&cr("v1", "Pod", None, "a"));
        wrapped.correlate(&cr("v1", "Secret", None, "b"));

        if let Correlator::Metrics(_, metrics) = &wrapped {
            assert_eq!(metrics.matched_templates_names().get("pod.yaml"), Some(&1));
            assert_eq!(metrics.unmatched_crs().len(), 1);
        } else {
            unreachable!();
        }
    }
}
