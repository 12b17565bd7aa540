//! Named omission-set resolution and application (component B).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};
use crate::path::{self, Path};

/// The well-known set that is always available and always injected as
/// part of the default omission behaviour.
pub const BUILT_IN_SET: &str = "cluster-compare-built-in";

fn built_in_paths() -> Vec<&'static str> {
    vec![
        "metadata.resourceVersion",
        "metadata.generation",
        "metadata.uid",
        "metadata.generateName",
        "metadata.creationTimestamp",
        "metadata.finalizers",
        r#"metadata.annotations."kubectl.kubernetes.io/last-applied-configuration""#,
        "status",
    ]
}

/// One entry in a named omission set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OmitEntry {
    /// A literal path to strip.
    Path {
        #[serde(rename = "pathToKey")]
        path_to_key: String,
        #[serde(rename = "isPrefix", default)]
        is_prefix: bool,
    },
    /// A reference to another named set, expanded in place.
    Include { include: String },
}

/// The `FieldsToOmit` registry: named sets of entries plus a default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FieldsToOmit {
    #[serde(default)]
    pub items: HashMap<String, Vec<OmitEntry>>,
    #[serde(rename = "defaultOmitRef", default)]
    pub default_omit_ref: Option<String>,
}

/// A resolved path with its prefix-match flag, ready for `apply`.
#[derive(Debug, Clone)]
pub struct ResolvedOmitPath {
    pub path: Path,
    pub is_prefix: bool,
}

impl FieldsToOmit {
    /// Every registry always has the built-in set available, whether or
    /// not the metadata file declared entries for it.
    fn lookup(&self, name: &str) -> Option<&Vec<OmitEntry>> {
        self.items.get(name)
    }

    /// Validate that `defaultOmitRef` and every `fieldsToOmitRefs` entry
    /// used by the reference resolve, and that the include graph has no
    /// cycles.
    pub fn validate(&self, used_refs: &[String]) -> Result<()> {
        if let Some(default_ref) = &self.default_omit_ref {
            self.resolve(default_ref)?;
        }
        for r in used_refs {
            self.resolve(r)?;
        }
        for name in self.items.keys() {
            self.resolve(name)?;
        }
        Ok(())
    }

    /// Resolve a named set into a flat list of `ResolvedOmitPath`,
    /// following `include` references and detecting cycles.
    pub fn resolve(&self, set_name: &str) -> Result<Vec<ResolvedOmitPath>> {
        let mut stack = Vec::new();
        let mut out = Vec::new();
        self.resolve_into(set_name, &mut stack, &mut out)?;
        Ok(out)
    }

    fn resolve_into(
        &self,
        set_name: &str,
        stack: &mut Vec<String>,
        out: &mut Vec<ResolvedOmitPath>,
    ) -> Result<()> {
        if let Some(pos) = stack.iter().position(|s| s == set_name) {
            let mut chain = stack[pos..].to_vec();
            chain.push(set_name.to_string());
            return Err(CoreError::CyclicInclude {
                chain: chain.join(" -> "),
            });
        }

        if set_name == BUILT_IN_SET && !self.items.contains_key(BUILT_IN_SET) {
            for raw in built_in_paths() {
                out.push(ResolvedOmitPath {
                    path: Path::parse(raw)?,
                    is_prefix: false,
                });
            }
            return Ok(());
        }

        let entries = self
            .lookup(set_name)
            .ok_or_else(|| CoreError::UnknownOmitSet {
                name: set_name.to_string(),
            })?;

        stack.push(set_name.to_string());
        for entry in entries {
            match entry {
                OmitEntry::Path { path_to_key, is_prefix } => {
                    out.push(ResolvedOmitPath {
                        path: Path::parse(path_to_key)?,
                        is_prefix: *is_prefix,
                    });
                }
                OmitEntry::Include { include } => {
                    self.resolve_into(include, stack, out)?;
                }
            }
        }
        stack.pop();
        Ok(())
    }
}

/// Strip every path in `paths` from `obj`, cleaning up empty parent
/// mappings as it goes (§4.B). Prefix paths remove every node whose
/// segment sequence starts with the given prefix; non-prefix paths
/// must match exactly.
pub fn apply(obj: &mut JsonValue, paths: &[ResolvedOmitPath]) -> Result<()> {
    for p in paths {
        if p.is_prefix {
            apply_prefix(obj, &p.path)?;
        } else {
            // Removing a path that is not present is a no-op, not an error.
            if path::get(obj, &p.path)?.is_some() {
                path::remove(obj, &p.path)?;
            }
        }
    }
    Ok(())
}

/// Prefix removal has no fixed depth, so it is resolved by walking the
/// live tree and pruning every node whose address is the longest common
/// prefix matched by `prefix` (§4.B), stopping descent as soon as a node
/// matches so nested descendants aren't revisited.
fn apply_prefix(obj: &mut JsonValue, prefix: &Path) -> Result<()> {
    let mut matches = Vec::new();
    let mut current = Vec::new();
    collect_prefix_matches(obj, &mut current, prefix, &mut matches);
    for m in matches {
        if path::get(obj, &m)?.is_some() {
            path::remove(obj, &m)?;
        }
    }
    Ok(())
}

fn collect_prefix_matches(obj: &JsonValue, current: &mut Vec<String>, prefix: &Path, out: &mut Vec<Path>) {
    let candidate = Path::from_segments(current.clone());
    if !candidate.is_empty() && prefix.is_prefix_of(&candidate) {
        out.push(candidate);
        return;
    }
    match obj {
        JsonValue::Object(map) => {
            for (key, value) in map {
                current.push(key.clone());
                collect_prefix_matches(value, current, prefix, out);
                current.pop();
            }
        }
        JsonValue::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                current.push(index.to_string());
                collect_prefix_matches(value, current, prefix, out);
                current.pop();
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> FieldsToOmit {
        let mut items = HashMap::new();
        items.insert(
            "extra".to_string(),
            vec![OmitEntry::Path {
                path_to_key: "spec.replicas".to_string(),
                is_prefix: false,
            }],
        );
        items.insert(
            "combined".to_string(),
            vec![
                OmitEntry::Include {
                    include: BUILT_IN_SET.to_string(),
                },
                OmitEntry::Include {
                    include: "extra".to_string(),
                },
            ],
        );
        FieldsToOmit {
            items,
            default_omit_ref: Some("combined".to_string()),
        }
    }

    #[test]
    fn resolves_built_in_and_includes() {
        let reg = registry();
        let resolved = reg.resolve("combined").unwrap();
        assert!(resolved.iter().any(|p| p.path.as_str() == "status"));
        assert!(resolved.iter().any(|p| p.path.as_str() == "spec.replicas"));
    }

    #[test]
    fn detects_cycles_with_full_chain() {
        let mut items = HashMap::new();
        items.insert(
            "x".to_string(),
            vec![OmitEntry::Include { include: "y".to_string() }],
        );
        items.insert(
            "y".to_string(),
            vec![OmitEntry::Include { include: "x".to_string() }],
        );
        let reg = FieldsToOmit { items, default_omit_ref: None };
        let err = reg.resolve("x").unwrap_err();
        assert!(err.to_string().contains("circular import found x -> y -> x"));
    }

    #[test]
    fn unknown_ref_is_an_error() {
        let reg = FieldsToOmit::default();
        assert!(matches!(
            reg.resolve("nope"),
            Err(CoreError::UnknownOmitSet { .. })
        ));
    }

    #[test]
    fn prefix_removes_every_descendant_not_just_the_exact_node() {
        let paths = vec![ResolvedOmitPath { path: Path::parse("metadata.annotations").unwrap(), is_prefix: true }];
        let mut obj = json!({
            "metadata": {
                "annotations": {
                    "a": "1",
                    "b": {"nested": "2"},
                },
                "name": "keep-me",
            },
        });
        apply(&mut obj, &paths).unwrap();
        assert_eq!(obj, json!({"metadata": {"name": "keep-me"}}));
    }

    #[test]
    fn prefix_matches_a_concrete_array_index() {
        let paths = vec![ResolvedOmitPath { path: Path::parse("spec.containers.0.env").unwrap(), is_prefix: true }];
        let mut obj = json!({
            "spec": {
                "containers": [
                    {"name": "app", "env": [{"name": "X", "value": "1"}]},
                    {"name": "sidecar", "env": [{"name": "Y", "value": "2"}]},
                ],
            },
        });
        apply(&mut obj, &paths).unwrap();
        assert_eq!(
            obj,
            json!({"spec": {"containers": [
                {"name": "app"},
                {"name": "sidecar", "env": [{"name": "Y", "value": "2"}]},
            ]}})
        );
    }

    #[test]
    fn apply_is_idempotent() {
        let reg = registry();
        let paths = reg.resolve("combined").unwrap();
        let mut obj = json!({
            "spec": {"replicas": 3, "image": "nginx"},
            "status": {"ready": true},
        });
        apply(&mut obj, &paths).unwrap();
        let once = obj.clone();
        apply(&mut obj, &paths).unwrap();
        assert_eq!(obj, once);
        assert_eq!(obj, json!({"spec": {"image": "nginx"}}));
    }
}
