//! Reference-bundle loading: metadata-file dialect dispatch, cardinality
//! validation, the empty-parameter render pass, and metadata-hash
//! computation (§4.D).

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use clustercompare_core::{
    Cardinality, Component, EmptyInventory, InlineDiffFunc, Part, PerFieldConfig, Reference,
    ReferenceVersion, Template, TemplateConfig,
};
use clustercompare_core::path as accessor;
use clustercompare_render::Engine;

use crate::dialect::{
    ApiVersionProbe, RawComponentKindV1, RawComponentV1, RawComponentV2, RawPartV1, RawPartV2,
    RawReferenceV1, RawReferenceV2, RawTemplate, RawTemplateConfig,
};
use crate::error::{LoaderError, Result};

const METADATA_FILENAMES: &[&str] = &["metadata.yaml", "metadata.yml"];

/// Load and fully validate a reference bundle rooted at `root` (a
/// resolved local directory, e.g. as produced by the fetch collaborator).
/// Returns the immutable [`Reference`] plus its metadata hash.
pub fn load_reference(root: &FsPath) -> Result<(Reference, String)> {
    let metadata_path = find_metadata_file(root)?;
    let raw_text = std::fs::read_to_string(&metadata_path)?;

    let probe: ApiVersionProbe = serde_yaml::from_str(&raw_text)?;
    let canonical_yaml = canonicalize_yaml(&raw_text)?;

    let (parts, template_function_files, fields_to_omit, version) = match probe.api_version.as_str() {
        "clustercompare.openshift.io/v2" | "v2" => {
            let raw: RawReferenceV2 = serde_yaml::from_str(&raw_text)?;
            let parts = raw.parts.iter().map(convert_part_v2).collect::<Result<Vec<_>>>()?;
            (parts, raw.template_function_files, raw.fields_to_omit, ReferenceVersion::V2)
        }
        "clustercompare.openshift.io/v1" | "v1" => {
            let raw: RawReferenceV1 = serde_yaml::from_str(&raw_text)?;
            let parts = raw.parts.iter().map(convert_part_v1).collect::<Result<Vec<_>>>()?;
            (parts, raw.template_function_files, raw.fields_to_omit, ReferenceVersion::V1)
        }
        other => return Err(LoaderError::UnsupportedApiVersion(other.to_string())),
    };

    if parts.is_empty() {
        return Err(LoaderError::EmptyReference);
    }

    let mut parts = read_template_sources(root, parts)?;

    let used_refs: Vec<String> = parts
        .iter()
        .flat_map(|p| p.components.iter())
        .flat_map(|c| c.templates.iter())
        .flat_map(|t| t.config.fields_to_omit_refs.clone())
        .collect();
    fields_to_omit.validate(&used_refs)?;

    let function_file_sources = template_function_files
        .iter()
        .map(|path| Ok((path.clone(), std::fs::read_to_string(root.join(path))?)))
        .collect::<Result<Vec<(String, String)>>>()?;

    let engine = build_render_engine(&function_file_sources)?;
    render_all_metadata(&mut parts, &engine)?;
    validate_per_field_configs(&parts)?;

    let mut template_sources: Vec<(String, String)> = parts
        .iter()
        .flat_map(|p| p.components.iter())
        .flat_map(|c| c.templates.iter())
        .map(|t| (t.path.clone(), t.source.clone()))
        .collect();
    template_sources.extend(function_file_sources);

    let metadata_hash = clustercompare_core::hash::compute_metadata_hash(&canonical_yaml, &template_sources);

    let reference = Reference {
        version,
        parts,
        template_function_files,
        fields_to_omit,
    };

    Ok((reference, metadata_hash))
}

fn find_metadata_file(root: &FsPath) -> Result<PathBuf> {
    for name in METADATA_FILENAMES {
        let candidate = root.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(LoaderError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no metadata.yaml found under {}", root.display()),
    )))
}

/// Re-serialize the parsed YAML document so two metadata files differing
/// only in formatting/comments hash identically.
fn canonicalize_yaml(raw_text: &str) -> Result<String> {
    let value: serde_yaml::Value = serde_yaml::from_str(raw_text)?;
    Ok(serde_yaml::to_string(&value)?)
}

fn convert_template_config(raw: RawTemplateConfig) -> Result<TemplateConfig> {
    let per_field = raw
        .per_field
        .into_iter()
        .map(|f| {
            Ok(PerFieldConfig {
                path_to_key: accessor::Path::parse(&f.path_to_key)?,
                inline_diff_func: f.inline_diff_func,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(TemplateConfig {
        allow_merge: raw.allow_merge,
        fields_to_omit_refs: raw.fields_to_omit_refs,
        per_field,
    })
}

fn convert_template(raw: RawTemplate) -> Result<Template> {
    Ok(Template {
        path: raw.path,
        description: raw.description,
        source: String::new(),
        config: convert_template_config(raw.config)?,
        metadata: None,
    })
}

fn convert_templates(raw: Vec<RawTemplate>) -> Result<Vec<Template>> {
    raw.into_iter().map(convert_template).collect()
}

fn convert_part_v2(raw: &RawPartV2) -> Result<Part> {
    let components = raw
        .components
        .iter()
        .map(convert_component_v2)
        .collect::<Result<Vec<_>>>()?;
    Ok(Part {
        name: raw.name.clone(),
        description: raw.description.clone(),
        components,
    })
}

fn convert_component_v2(raw: &RawComponentV2) -> Result<Component> {
    let groups: Vec<(&str, Cardinality, &Option<Vec<RawTemplate>>)> = vec![
        ("oneOf", Cardinality::OneOf, &raw.one_of),
        ("noneOf", Cardinality::NoneOf, &raw.none_of),
        ("allOf", Cardinality::AllOf, &raw.all_of),
        ("anyOf", Cardinality::AnyOf, &raw.any_of),
        ("anyOneOf", Cardinality::AnyOneOf, &raw.any_one_of),
        ("allOrNoneOf", Cardinality::AllOrNoneOf, &raw.all_or_none_of),
    ];
    let set: Vec<&(&str, Cardinality, &Option<Vec<RawTemplate>>)> =
        groups.iter().filter(|(_, _, v)| v.is_some()).collect();

    if set.is_empty() {
        return Err(LoaderError::NoCardinalityKey { component: raw.name.clone() });
    }
    if set.len() > 1 {
        let keys = set.iter().map(|(k, _, _)| *k).collect::<Vec<_>>().join(", ");
        return Err(LoaderError::MultipleCardinalityKeys { component: raw.name.clone(), keys });
    }

    let (_, cardinality, templates) = set[0];
    let templates = convert_templates(templates.clone().unwrap_or_default())?;
    Ok(Component {
        name: raw.name.clone(),
        description: raw.description.clone(),
        cardinality: *cardinality,
        templates,
    })
}

/// v1 legacy conversion. `type: Required` with `requiredTemplates` maps
/// to `allOf`; `type: Optional` folds both template lists into one
/// `anyOf` group (the distinction is moot once the whole group is
/// optional). A `Required` component that *also* lists
/// `optionalTemplates` yields a second, synthetic `anyOf` component
/// rather than being reconciled with `allOrNoneOf` — the legacy
/// dialect's own partial redundancy is preserved, not rationalised.
fn convert_part_v1(raw: &RawPartV1) -> Result<Part> {
    let mut components = Vec::new();
    for raw_component in &raw.components {
        components.extend(convert_component_v1(raw_component)?);
    }
    Ok(Part {
        name: raw.name.clone(),
        description: raw.description.clone(),
        components,
    })
}

fn convert_component_v1(raw: &RawComponentV1) -> Result<Vec<Component>> {
    match raw.kind {
        RawComponentKindV1::Required => {
            let mut out = vec![Component {
                name: raw.name.clone(),
                description: raw.description.clone(),
                cardinality: Cardinality::AllOf,
                templates: convert_templates(raw.required_templates.clone())?,
            }];
            if !raw.optional_templates.is_empty() {
                out.push(Component {
                    name: format!("{} (optional)", raw.name),
                    description: raw.description.clone(),
                    cardinality: Cardinality::AnyOf,
                    templates: convert_templates(raw.optional_templates.clone())?,
                });
            }
            Ok(out)
        }
        RawComponentKindV1::Optional => {
            let mut combined = raw.required_templates.clone();
            combined.extend(raw.optional_templates.clone());
            Ok(vec![Component {
                name: raw.name.clone(),
                description: raw.description.clone(),
                cardinality: Cardinality::AnyOf,
                templates: convert_templates(combined)?,
            }])
        }
    }
}

fn read_template_sources(root: &FsPath, mut parts: Vec<Part>) -> Result<Vec<Part>> {
    for part in &mut parts {
        for component in &mut part.components {
            for template in &mut component.templates {
                let file_path = root.join(&template.path);
                if !file_path.is_file() {
                    return Err(LoaderError::TemplateFileMissing {
                        path: template.path.clone(),
                        root: root.display().to_string(),
                    });
                }
                template.source = std::fs::read_to_string(&file_path)?;
            }
        }
    }
    Ok(parts)
}

fn build_render_engine(function_files: &[(String, String)]) -> Result<Engine<'static>> {
    let mut engine = Engine::new(Arc::new(EmptyInventory));
    for (name, source) in function_files {
        engine.add_function_file(name, source)?;
    }
    Ok(engine)
}

fn render_all_metadata(parts: &mut [Part], engine: &Engine<'_>) -> Result<()> {
    for part in parts {
        for component in &mut part.components {
            for template in &mut component.templates {
                template.metadata = Some(engine.render_metadata(&template.path, &template.source)?);
            }
        }
    }
    Ok(())
}

/// (v2) `perField.pathToKey` must exist in the rendered-empty metadata,
/// and the configured value must validate against the declared
/// inline-diff function's pattern syntax.
fn validate_per_field_configs(parts: &[Part]) -> Result<()> {
    for template in parts.iter().flat_map(|p| p.components.iter()).flat_map(|c| c.templates.iter()) {
        let Some(metadata) = &template.metadata else { continue };
        for field in &template.config.per_field {
            let value = accessor::get(metadata, &field.path_to_key)?;
            let Some(value) = value else {
                return Err(LoaderError::Core(clustercompare_core::CoreError::MalformedPath {
                    path: field.path_to_key.as_str().to_string(),
                    reason: format!("perField path does not exist in rendered template '{}'", template.path),
                }));
            };
            let pattern = value
                .as_str()
                .ok_or_else(|| LoaderError::Core(clustercompare_core::CoreError::MalformedPath {
                    path: field.path_to_key.as_str().to_string(),
                    reason: "perField value must be a string pattern".to_string(),
                }))?;
            validate_pattern(pattern, field.inline_diff_func)?;
        }
    }
    Ok(())
}

fn validate_pattern(pattern: &str, func: InlineDiffFunc) -> Result<()> {
    let translated = match func {
        InlineDiffFunc::Regex => pattern.to_string(),
        InlineDiffFunc::Capturegroups => pattern.replace("(?<", "(?P<"),
    };
    regex::Regex::new(&translated)
        .map_err(|e| LoaderError::Core(clustercompare_core::CoreError::MalformedPath {
            path: "perField".to_string(),
            reason: format!("invalid pattern '{}': {}", pattern, e),
        }))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &FsPath, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn loads_a_minimal_v2_bundle() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "metadata.yaml",
            r#"
apiVersion: clustercompare.openshift.io/v2
parts:
  - name: core
    components:
      - name: deployment
        allOf:
          - path: templates/deploy.yaml
"#,
        );
        write_file(
            dir.path(),
            "templates/deploy.yaml",
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: demo\n",
        );

        let (reference, hash) = load_reference(dir.path()).unwrap();
        assert_eq!(reference.parts.len(), 1);
        assert_eq!(reference.parts[0].components[0].cardinality, Cardinality::AllOf);
        assert!(!hash.is_empty());
        assert_eq!(reference.find_template("templates/deploy.yaml").unwrap().kind(), Some("Deployment"));
    }

    #[test]
    fn rejects_component_with_two_cardinality_keys() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "metadata.yaml",
            r#"
apiVersion: clustercompare.openshift.io/v2
parts:
  - name: core
    components:
      - name: bad
        allOf:
          - path: templates/a.yaml
        anyOf:
          - path: templates/a.yaml
"#,
        );
        write_file(dir.path(), "templates/a.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n");

        let err = load_reference(dir.path()).unwrap_err();
        assert!(matches!(err, LoaderError::MultipleCardinalityKeys { .. }));
    }

    #[test]
    fn rejects_component_with_no_cardinality_key() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "metadata.yaml",
            r#"
apiVersion: clustercompare.openshift.io/v2
parts:
  - name: core
    components:
      - name: bad
"#,
        );

        let err = load_reference(dir.path()).unwrap_err();
        assert!(matches!(err, LoaderError::NoCardinalityKey { .. }));
    }

    #[test]
    fn v1_required_with_optional_templates_yields_two_components() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "metadata.yaml",
            r#"
apiVersion: clustercompare.openshift.io/v1
parts:
  - name: core
    components:
      - name: deployment
        type: Required
        requiredTemplates:
          - path: templates/a.yaml
        optionalTemplates:
          - path: templates/b.yaml
"#,
        );
        write_file(dir.path(), "templates/a.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n");
        write_file(dir.path(), "templates/b.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: b\n");

        let (reference, _hash) = load_reference(dir.path()).unwrap();
        assert_eq!(reference.parts[0].components.len(), 2);
        assert_eq!(reference.parts[0].components[0].cardinality, Cardinality::AllOf);
        assert_eq!(reference.parts[0].components[1].cardinality, Cardinality::AnyOf);
    }

    #[test]
    fn missing_template_file_is_an_error() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "metadata.yaml",
            r#"
apiVersion: clustercompare.openshift.io/v2
parts:
  - name: core
    components:
      - name: deployment
        allOf:
          - path: templates/missing.yaml
"#,
        );

        let err = load_reference(dir.path()).unwrap_err();
        assert!(matches!(err, LoaderError::TemplateFileMissing { .. }));
    }

    #[test]
    fn hash_is_stable_across_comment_only_changes() {
        let dir1 = tempdir().unwrap();
        write_file(
            dir1.path(),
            "metadata.yaml",
            "apiVersion: clustercompare.openshift.io/v2\nparts:\n  - name: core\n    components:\n      - name: d\n        allOf:\n          - path: templates/a.yaml\n",
        );
        write_file(dir1.path(), "templates/a.yaml", "kind: ConfigMap\n{# a comment #}\napiVersion: v1\nmetadata:\n  name: a\n");

        let dir2 = tempdir().unwrap();
        write_file(
            dir2.path(),
            "metadata.yaml",
            "apiVersion: clustercompare.openshift.io/v2\nparts:\n  - name: core\n    components:\n      - name: d\n        allOf:\n          - path: templates/a.yaml\n",
        );
        write_file(dir2.path(), "templates/a.yaml", "kind:   ConfigMap\n{# a totally different comment #}\napiVersion:   v1\nmetadata:\n  name: a\n");

        let (_, hash1) = load_reference(dir1.path()).unwrap();
        let (_, hash2) = load_reference(dir2.path()).unwrap();
        assert_eq!(hash1, hash2);
    }
}
