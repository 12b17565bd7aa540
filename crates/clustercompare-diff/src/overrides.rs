//! Override engine (§4.G): user-authored exceptions that patch a
//! rendered template (or a cluster object, in generation mode) before
//! the textual diff is computed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{OverrideError, Result};

/// How an override's `patch` field should be interpreted and applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchType {
    Rfc6902,
    StrategicMerge,
    GoTemplate,
}

/// A user-authored override (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOverride {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub template_path: String,
    pub reason: Option<String>,
    pub patch: JsonValue,
    pub patch_type: PatchType,
}

impl UserOverride {
    /// An override applies iff its identifiers match the rendered
    /// template's identifiers.
    #[must_use]
    pub fn applies_to(&self, template_path: &str, api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> bool {
        self.template_path == template_path
            && self.api_version == api_version
            && self.kind == kind
            && self.name == name
            && self.namespace.as_deref() == namespace
    }
}

/// Kinds with known list-merge-key semantics (§4.G "Strategic-merge
/// schema knowledge"). Anything outside this table always takes the
/// structural-merge fallback.
const KNOWN_KINDS: &[&str] = &["Deployment", "StatefulSet", "DaemonSet", "Pod", "Service", "ConfigMap", "Secret"];

/// `field name -> merge key` for arrays-of-objects under that field,
/// for the kinds in `KNOWN_KINDS`.
fn list_merge_key(field: &str) -> Option<&'static str> {
    match field {
        "containers" | "initContainers" | "ephemeralContainers" | "volumes" | "volumeMounts" | "env" | "ports" => Some("name"),
        _ => None,
    }
}

fn is_known_kind(kind: &str) -> bool {
    KNOWN_KINDS.contains(&kind)
}

/// Apply a patch of the given `patch_type` to `target`, with `cluster_object`
/// available for the `go-template` variant's render context.
pub fn apply_patch(
    target: &mut JsonValue,
    override_: &UserOverride,
    cluster_object: &JsonValue,
    render_engine: Option<&clustercompare_render::Engine>,
) -> Result<()> {
    if override_.reason.as_deref().unwrap_or("").trim().is_empty() {
        return Err(OverrideError::MissingReason { template: override_.template_path.clone() }.into());
    }

    match override_.patch_type {
        PatchType::Rfc6902 => apply_rfc6902(target, &override_.patch),
        PatchType::StrategicMerge => {
            strategic_merge(target, &override_.patch, &override_.kind);
            Ok(())
        }
        PatchType::GoTemplate => {
            let engine = render_engine.ok_or_else(|| {
                OverrideError::StrategicMerge("go-template override requires a render engine".to_string())
            })?;
            let template_source = override_
                .patch
                .as_str()
                .ok_or_else(|| OverrideError::StrategicMerge("go-template override patch must be a string".to_string()))?;
            let rendered = engine.render(&override_.template_path, template_source, cluster_object)?;
            strategic_merge(target, &rendered, &override_.kind);
            Ok(())
        }
    }
}

fn apply_rfc6902(target: &mut JsonValue, patch: &JsonValue) -> Result<()> {
    let ops: json_patch::Patch =
        serde_json::from_value(patch.clone()).map_err(|e| OverrideError::Rfc6902(e.to_string()))?;
    json_patch::patch(target, &ops).map_err(|e| OverrideError::Rfc6902(e.to_string()))?;
    Ok(())
}

/// Strategic-merge `patch` into `target`. For kinds in `KNOWN_KINDS`,
/// arrays-of-objects under a recognised field are merged by key; every
/// other case (unknown kind, or a field with no known merge key) falls
/// back to a plain structural merge (objects merge recursively, arrays
/// replace wholesale).
pub fn strategic_merge(target: &mut JsonValue, patch: &JsonValue, kind: &str) {
    strategic_merge_inner(target, patch, if is_known_kind(kind) { Some("") } else { None });
}

fn strategic_merge_inner(target: &mut JsonValue, patch: &JsonValue, field_scope: Option<&str>) {
    match (target, patch) {
        (JsonValue::Object(target_map), JsonValue::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) => strategic_merge_inner(existing, patch_value, field_scope.map(|_| key.as_str())),
                    None => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target_slot @ JsonValue::Array(_), JsonValue::Array(patch_items)) => {
            let merge_key = field_scope.and_then(list_merge_key);
            match merge_key {
                Some(key) if items_are_objects_with_key(target_slot, key) => {
                    merge_array_by_key(target_slot, patch_items, key);
                }
                _ => *target_slot = JsonValue::Array(patch_items.clone()),
            }
        }
        (target_slot, patch_value) => *target_slot = patch_value.clone(),
    }
}

fn items_are_objects_with_key(value: &JsonValue, key: &str) -> bool {
    match value {
        JsonValue::Array(items) => items.iter().all(|i| i.get(key).is_some()),
        _ => false,
    }
}

fn merge_array_by_key(target: &mut JsonValue, patch_items: &[JsonValue], key: &str) {
    let JsonValue::Array(existing) = target else { return };
    let mut merged: Vec<JsonValue> = existing.clone();

    for patch_item in patch_items {
        let patch_key_value = patch_item.get(key);
        let existing_idx = patch_key_value.and_then(|pk| merged.iter().position(|e| e.get(key) == Some(pk)));
        match existing_idx {
            Some(idx) => strategic_merge_inner(&mut merged[idx], patch_item, Some("")),
            None => merged.push(patch_item.clone()),
        }
    }

    *target = JsonValue::Array(merged);
}

/// Generation mode (§4.G): emit a skeleton override whose `patch` encodes
/// the structural diff between the rendered template and the cluster
/// object, for the operator to fill in a `reason` and refine.
#[must_use]
pub fn generate_skeleton_override(
    template_path: &str,
    api_version: &str,
    kind: &str,
    namespace: Option<&str>,
    name: &str,
    rendered_template: &JsonValue,
    cluster_object: &JsonValue,
) -> UserOverride {
    let patch = structural_diff(rendered_template, cluster_object);
    UserOverride {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        namespace: namespace.map(str::to_string),
        template_path: template_path.to_string(),
        reason: None,
        patch,
        patch_type: PatchType::StrategicMerge,
    }
}

/// A minimal structural diff: fields present in `actual` that differ
/// from (or are absent in) `reference` are carried forward as-is; this
/// is intentionally the same shape a `strategic-merge` patch expects.
fn structural_diff(reference: &JsonValue, actual: &JsonValue) -> JsonValue {
    match (reference, actual) {
        (JsonValue::Object(reference_map), JsonValue::Object(actual_map)) => {
            let mut out = Map::new();
            for (key, actual_value) in actual_map {
                match reference_map.get(key) {
                    Some(reference_value) if reference_value == actual_value => {}
                    Some(reference_value) => {
                        let nested = structural_diff(reference_value, actual_value);
                        if !(nested.is_object() && nested.as_object().is_some_and(Map::is_empty)) {
                            out.insert(key.clone(), nested);
                        }
                    }
                    None => {
                        out.insert(key.clone(), actual_value.clone());
                    }
                }
            }
            JsonValue::Object(out)
        }
        (reference, actual) if reference == actual => JsonValue::Object(Map::new()),
        (_, actual) => actual.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn override_(patch_type: PatchType, patch: JsonValue) -> UserOverride {
        UserOverride {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            name: "demo".to_string(),
            namespace: Some("default".to_string()),
            template_path: "deploy.yaml".to_string(),
            reason: Some("known drift, approved by platform team".to_string()),
            patch,
            patch_type,
        }
    }

    #[test]
    fn missing_reason_is_fatal() {
        let mut target = json!({"spec": {"replicas": 3}});
        let mut override_ = override_(PatchType::StrategicMerge, json!({"spec": {"replicas": 5}}));
        override_.reason = None;
        let err = apply_patch(&mut target, &override_, &json!({}), None).unwrap_err();
        assert!(matches!(err, crate::error::DiffCrateError::Override(OverrideError::MissingReason { .. })));
    }

    #[test]
    fn rfc6902_applies_operations() {
        let mut target = json!({"spec": {"replicas": 3}});
        let override_ = override_(
            PatchType::Rfc6902,
            json!([{"op": "replace", "path": "/spec/replicas", "value": 5}]),
        );
        apply_patch(&mut target, &override_, &json!({}), None).unwrap();
        assert_eq!(target["spec"]["replicas"], json!(5));
    }

    #[test]
    fn strategic_merge_merges_containers_by_name() {
        let mut target = json!({
            "spec": {"template": {"spec": {"containers": [
                {"name": "app", "image": "app:1.0"},
                {"name": "sidecar", "image": "sidecar:1.0"},
            ]}}}
        });
        let patch = json!({
            "spec": {"template": {"spec": {"containers": [
                {"name": "app", "image": "app:2.0"},
            ]}}}
        });
        strategic_merge(&mut target, &patch, "Deployment");
        let containers = target["spec"]["template"]["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0]["image"], json!("app:2.0"));
        assert_eq!(containers[1]["image"], json!("sidecar:1.0"));
    }

    #[test]
    fn unknown_kind_falls_back_to_structural_merge() {
        let mut target = json!({"spec": {"items": [{"name": "a"}, {"name": "b"}]}});
        let patch = json!({"spec": {"items": [{"name": "a"}]}});
        strategic_merge(&mut target, &patch, "MyCustomResource");
        assert_eq!(target["spec"]["items"], json!([{"name": "a"}]));
    }

    #[test]
    fn structural_diff_carries_only_changed_fields() {
        let reference = json!({"spec": {"replicas": 3, "paused": false}});
        let actual = json!({"spec": {"replicas": 5, "paused": false}});
        let diff = structural_diff(&reference, &actual);
        assert_eq!(diff, json!({"spec": {"replicas": 5}}));
    }
}
