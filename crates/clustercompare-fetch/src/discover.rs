//! Generic discovery of every file path a `metadata.yaml` references,
//! without depending on the typed v1/v2 dialect structs (those live in
//! the loader crate, which this crate must not depend on).
//!
//! Walks the raw YAML value collecting every string found under a
//! `path` key, and every string in an array found under a
//! `templateFunctionFiles` key, at any depth.

use serde_yaml::Value as YamlValue;
use std::collections::BTreeSet;

#[must_use]
pub fn discover_referenced_paths(metadata: &YamlValue) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    walk(metadata, &mut paths);
    paths
}

fn walk(value: &YamlValue, paths: &mut BTreeSet<String>) {
    match value {
        YamlValue::Mapping(map) => {
            for (key, v) in map {
                let key_str = key.as_str().unwrap_or_default();
                if key_str == "path" {
                    if let Some(s) = v.as_str() {
                        paths.insert(s.to_string());
                    }
                } else if key_str == "templateFunctionFiles" {
                    if let Some(seq) = v.as_sequence() {
                        for item in seq {
                            if let Some(s) = item.as_str() {
                                paths.insert(s.to_string());
                            }
                        }
                    }
                } else {
                    walk(v, paths);
                }
            }
        }
        YamlValue::Sequence(seq) => {
            for item in seq {
                walk(item, paths);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_template_paths_and_function_files() {
        let yaml = serde_yaml::from_str::<YamlValue>(
            r#"
apiVersion: v2
templateFunctionFiles:
  - helpers.tpl
parts:
  - name: core
    components:
      - allOf:
          - path: deploy.yaml
          - path: svc.yaml
"#,
        )
        .unwrap();
        let paths = discover_referenced_paths(&yaml);
        assert_eq!(paths.len(), 3);
        assert!(paths.contains("deploy.yaml"));
        assert!(paths.contains("svc.yaml"));
        assert!(paths.contains("helpers.tpl"));
    }
}
