//! Comparison driver (§4.H, §5): bounded-concurrency worker pool that
//! runs correlate → render → omit → inline-diff → external-diff →
//! override for every cluster resource in the input stream.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clustercompare_core::{Cardinality, ClusterResource, DiffSum, Reference, Summary, ValidationIssue};
use indexmap::IndexMap;

use crate::correlate::{Correlator, Metrics};
use crate::error::{DiffCrateError, Result};
use crate::overrides::UserOverride;

/// Knobs the CLI resolves from flags before calling `run`.
pub struct DriverOptions {
    pub concurrency: usize,
    pub overrides: Vec<UserOverride>,
    pub external_diff_command: Vec<String>,
    /// Render engine used to render each template against its correlated
    /// CR (§4.E) and for `go-template` overrides.
    pub render_engine: Arc<clustercompare_render::Engine<'static>>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            overrides: Vec::new(),
            external_diff_command: vec!["diff".into(), "-u".into(), "-N".into()],
            render_engine: Arc::new(clustercompare_render::Engine::default()),
        }
    }
}

/// The full outcome of one comparison run.
pub struct DriverOutput {
    pub diffs: Vec<DiffSum>,
    pub summary: Summary,
}

/// Run the correlate → diff pipeline over `resources`, bounded to
/// `options.concurrency` concurrent workers.
///
/// `metadata_hash` is carried through unchanged into the `Summary` for
/// the reporter's JUnit properties.
pub async fn run(
    reference: Arc<Reference>,
    correlator: Arc<Correlator>,
    resources: Vec<ClusterResource>,
    options: DriverOptions,
    metadata_hash: String,
) -> Result<DriverOutput> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(options.concurrency.max(1)));
    let metrics = Arc::new(Metrics::new());
    let diffs: Arc<Mutex<Vec<DiffSum>>> = Arc::new(Mutex::new(Vec::new()));
    let cancelled = Arc::new(AtomicBool::new(false));
    let first_error: Arc<Mutex<Option<DiffCrateError>>> = Arc::new(Mutex::new(None));
    let overrides = Arc::new(options.overrides);
    let external_diff_command = Arc::new(options.external_diff_command);
    let render_engine = options.render_engine;

    let mut join_set = tokio::task::JoinSet::new();
    let total_crs = resources.len();

    for resource in resources {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
        let reference = reference.clone();
        let correlator = correlator.clone();
        let metrics = metrics.clone();
        let diffs = diffs.clone();
        let cancelled = cancelled.clone();
        let first_error = first_error.clone();
        let overrides = overrides.clone();
        let external_diff_command = external_diff_command.clone();
        let render_engine = render_engine.clone();

        join_set.spawn(async move {
            let _permit = permit;
            match compare_one(&reference, &correlator, &resource, &overrides, &external_diff_command, &render_engine).await {
                Ok(Some(diff_sum)) => {
                    if let Some(first) = diff_sum.correlated_template.as_deref() {
                        metrics.record_match(first);
                    }
                    diffs.lock().unwrap().push(diff_sum);
                }
                Ok(None) => {
                    metrics.record_unmatched(&resource.correlation_id());
                }
                Err(e @ DiffCrateError::Io(_)) | Err(e @ DiffCrateError::DiffProcess(_)) | Err(e @ DiffCrateError::Render(_)) => {
                    cancelled.store(true, Ordering::Relaxed);
                    first_error.lock().unwrap().get_or_insert(e);
                }
                Err(e) => {
                    metrics.record_unmatched(&resource.correlation_id());
                    first_error.lock().unwrap().get_or_insert(e);
                }
            }
        });
    }

    while join_set.join_next().await.is_some() {}

    if let Some(err) = first_error.lock().unwrap().take() {
        return Err(err);
    }

    let mut diffs = Arc::try_unwrap(diffs).expect("all workers joined").into_inner().unwrap();
    diffs.sort_by(|a, b| (a.correlated_template.as_deref(), &a.cr_name).cmp(&(b.correlated_template.as_deref(), &b.cr_name)));

    let matched_counts = metrics.matched_templates_names();
    let unmatched_crs = metrics.unmatched_crs();
    let (validation_issues, num_missing) = validate_cardinality(&reference, &matched_counts);

    let num_diff_crs = diffs.iter().filter(|d| !d.is_empty_diff()).count();
    let patched_crs = diffs.iter().filter(|d| d.patched).count();

    let summary = Summary {
        validation_issues,
        num_missing,
        unmatched_crs,
        num_diff_crs,
        total_crs,
        patched_crs,
        metadata_hash,
    };

    Ok(DriverOutput { diffs, summary })
}

async fn compare_one(
    reference: &Reference,
    correlator: &Correlator,
    resource: &ClusterResource,
    overrides: &[UserOverride],
    external_diff_command: &[String],
    render_engine: &clustercompare_render::Engine<'static>,
) -> Result<Option<DiffSum>> {
    let template_path = match correlator.resolve(resource, pick_best_by_path) {
        Ok(path) => path,
        Err(_) => return Ok(None),
    };

    let Some(template) = reference.find_template(&template_path) else {
        return Ok(None);
    };

    // §4.E: render the template with the CR itself as the root context,
    // not the empty-parameter render cached on the template for
    // correlator pre-indexing.
    let mut rendered_for_diff = render_engine.render(&template_path, &template.source, &resource.raw)?;
    let mut actual_for_diff = resource.raw.clone();

    let mut warnings = Vec::new();
    let mut captured = crate::inline_diff::CapturedValues::new();
    for field in &template.config.per_field {
        reconcile_per_field(&mut rendered_for_diff, &actual_for_diff, field, &mut captured, &mut warnings)?;
    }

    let omit_refs = template.effective_omit_refs(clustercompare_core::omit::BUILT_IN_SET);
    let mut omit_paths = Vec::new();
    for omit_ref in &omit_refs {
        omit_paths.extend(reference.fields_to_omit.resolve(omit_ref)?);
    }
    clustercompare_core::omit::apply(&mut rendered_for_diff, &omit_paths)?;
    clustercompare_core::omit::apply(&mut actual_for_diff, &omit_paths)?;

    let applicable: Vec<&UserOverride> = overrides
        .iter()
        .filter(|o| o.applies_to(&template_path, &resource.api_version, &resource.kind, resource.namespace.as_deref(), &resource.name))
        .collect();

    let mut override_reasons = Vec::new();
    for override_ in &applicable {
        crate::overrides::apply_patch(&mut rendered_for_diff, override_, &resource.raw, Some(render_engine))?;
        if let Some(reason) = &override_.reason {
            override_reasons.push(reason.clone());
        }
    }

    let diff_output = run_external_diff(&rendered_for_diff, &actual_for_diff, external_diff_command).await?;

    Ok(Some(DiffSum {
        cr_name: resource.display_name(),
        correlated_template: Some(template_path),
        diff_output,
        patched: !applicable.is_empty(),
        override_reasons,
        description: template.description.clone(),
        warnings,
    }))
}

/// Apply one `config.perField` entry (§4.C): pull the pattern out of the
/// rendered template and the plain value out of the cluster object at
/// the same path, reconcile them, and write the reconciled text back
/// into the rendered template so the textual diff sees the resolved
/// value instead of the raw pattern.
fn reconcile_per_field(
    rendered: &mut serde_json::Value,
    actual: &serde_json::Value,
    field: &clustercompare_core::PerFieldConfig,
    captured: &mut crate::inline_diff::CapturedValues,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let Some(pattern) = clustercompare_core::path::get(rendered, &field.path_to_key)?.and_then(|v| v.as_str()) else {
        return Ok(());
    };
    let Some(cluster_value) = clustercompare_core::path::get(actual, &field.path_to_key)?.and_then(|v| v.as_str()) else {
        return Ok(());
    };
    let pattern = pattern.to_string();
    let cluster_value = cluster_value.to_string();

    let reconciled = match field.inline_diff_func {
        clustercompare_core::InlineDiffFunc::Regex => crate::inline_diff::reconcile_regex(&pattern, &cluster_value)?,
        clustercompare_core::InlineDiffFunc::Capturegroups => {
            crate::inline_diff::reconcile_capturegroups(&pattern, &cluster_value, captured)?
        }
    };

    warnings.extend(reconciled.warnings);
    clustercompare_core::path::set(rendered, &field.path_to_key, serde_json::Value::String(reconciled.reconciled_value))?;
    Ok(())
}

fn pick_best_by_path(candidates: &[String]) -> String {
    let mut sorted = candidates.to_vec();
    sorted.sort();
    sorted.into_iter().next().expect("candidates is non-empty")
}

/// Shell out to the configured external diff command (suspension point,
/// §5). Exit codes `<= 1` are treated as success regardless of whether
/// the two sides differed.
async fn run_external_diff(expected: &serde_json::Value, actual: &serde_json::Value, command: &[String]) -> Result<String> {
    let expected_yaml = serde_yaml::to_string(expected).map_err(clustercompare_core::CoreError::from)?;
    let actual_yaml = serde_yaml::to_string(actual).map_err(clustercompare_core::CoreError::from)?;

    if expected_yaml == actual_yaml {
        return Ok(String::new());
    }

    let expected_file = tempfile_write(&expected_yaml).await?;
    let actual_file = tempfile_write(&actual_yaml).await?;

    let Some((program, args)) = command.split_first() else {
        return Ok(similar_text_diff(&expected_yaml, &actual_yaml));
    };

    let output = tokio::process::Command::new(program)
        .args(args)
        .arg(expected_file.path())
        .arg(actual_file.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    match output.status.code() {
        Some(code) if code <= 1 => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
        Some(code) => Err(DiffCrateError::DiffProcess(format!("external diff exited with code {code}"))),
        None => Err(DiffCrateError::DiffProcess("external diff terminated by signal".to_string())),
    }
}

async fn tempfile_write(contents: &str) -> Result<tempfile::NamedTempFile> {
    let file = tempfile::NamedTempFile::new()?;
    tokio::fs::write(file.path(), contents).await?;
    Ok(file)
}

fn similar_text_diff(expected: &str, actual: &str) -> String {
    use similar::{ChangeTag, TextDiff};
    let diff = TextDiff::from_lines(expected, actual);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str(sign);
        out.push_str(&change.to_string());
    }
    out
}

type ValidationIssues = IndexMap<String, IndexMap<String, ValidationIssue>>;

/// Cardinality validation (§4.D table), computed from the post-drain
/// match-count map.
fn validate_cardinality(reference: &Reference, matched_counts: &std::collections::HashMap<String, usize>) -> (ValidationIssues, usize) {
    let mut issues: ValidationIssues = IndexMap::new();
    let mut num_missing = 0usize;

    for part in &reference.parts {
        let mut part_issues: IndexMap<String, ValidationIssue> = IndexMap::new();
        for component in &part.components {
            let matched: Vec<&str> = component
                .templates
                .iter()
                .filter(|t| matched_counts.get(&t.path).copied().unwrap_or(0) > 0)
                .map(|t| t.path.as_str())
                .collect();
            let unmatched: Vec<String> = component
                .templates
                .iter()
                .filter(|t| matched_counts.get(&t.path).copied().unwrap_or(0) == 0)
                .map(|t| t.path.clone())
                .collect();

            let issue = match component.cardinality {
                Cardinality::AllOf if !unmatched.is_empty() => {
                    num_missing += unmatched.len();
                    Some(ValidationIssue { msg: "MissingCRs".to_string(), crs: unmatched, cr_metadata: None })
                }
                Cardinality::OneOf if matched.is_empty() => {
                    num_missing += component.templates.len();
                    Some(ValidationIssue {
                        msg: "One of the following is required".to_string(),
                        crs: unmatched,
                        cr_metadata: None,
                    })
                }
                Cardinality::OneOf if matched.len() > 1 => Some(ValidationIssue {
                    msg: "Should only match one but matched".to_string(),
                    crs: matched.into_iter().map(str::to_string).collect(),
                    cr_metadata: None,
                }),
                Cardinality::AnyOneOf if matched.len() > 1 => Some(ValidationIssue {
                    msg: "Should only match one but matched".to_string(),
                    crs: matched.into_iter().map(str::to_string).collect(),
                    cr_metadata: None,
                }),
                Cardinality::NoneOf if !matched.is_empty() => Some(ValidationIssue {
                    msg: "These should not have been matched".to_string(),
                    crs: matched.into_iter().map(str::to_string).collect(),
                    cr_metadata: None,
                }),
                Cardinality::AllOrNoneOf if !matched.is_empty() && !unmatched.is_empty() => {
                    Some(ValidationIssue { msg: "MissingCRs".to_string(), crs: unmatched, cr_metadata: None })
                }
                _ => None,
            };

            if let Some(issue) = issue {
                part_issues.insert(component.name.clone(), issue);
            }
        }
        if !part_issues.is_empty() {
            issues.insert(part.name.clone(), part_issues);
        }
    }

    (issues, num_missing)
}

/// Exit code for the process, given the summary and whether any
/// infrastructure error already short-circuited the run (§4.H).
#[must_use]
pub fn exit_code(summary: &Summary, diffs: &[DiffSum]) -> i32 {
    let has_drift = summary.num_missing > 0 || diffs.iter().any(|d| !d.is_empty_diff());
    if has_drift {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustercompare_core::{Component, Part, ReferenceVersion, Template, TemplateConfig};

    fn reference_with(cardinality: Cardinality, paths: &[&str]) -> Reference {
        Reference {
            version: ReferenceVersion::V2,
            parts: vec![Part {
                name: "part".to_string(),
                description: None,
                components: vec![Component {
                    name: "component".to_string(),
                    description: None,
                    cardinality,
                    templates: paths
                        .iter()
                        .map(|p| Template { path: (*p).to_string(), description: None, source: String::new(), config: TemplateConfig::default(), metadata: None })
                        .collect(),
                }],
            }],
            template_function_files: Vec::new(),
            fields_to_omit: Default::default(),
        }
    }

    #[test]
    fn all_of_reports_missing_crs() {
        let reference = reference_with(Cardinality::AllOf, &["a.yaml", "b.yaml"]);
        let mut matched = std::collections::HashMap::new();
        matched.insert("a.yaml".to_string(), 1usize);
        let (issues, num_missing) = validate_cardinality(&reference, &matched);
        assert_eq!(num_missing, 1);
        let issue = &issues["part"]["component"];
        assert_eq!(issue.msg, "MissingCRs");
        assert_eq!(issue.crs, vec!["b.yaml".to_string()]);
    }

    #[test]
    fn one_of_with_zero_matches_is_missing() {
        let reference = reference_with(Cardinality::OneOf, &["a.yaml", "b.yaml"]);
        let matched = std::collections::HashMap::new();
        let (issues, num_missing) = validate_cardinality(&reference, &matched);
        assert_eq!(num_missing, 2);
        assert_eq!(issues["part"]["component"].msg, "One of the following is required");
    }

    #[test]
    fn one_of_with_multiple_matches_does_not_contribute_to_missing() {
        let reference = reference_with(Cardinality::OneOf, &["a.yaml", "b.yaml"]);
        let mut matched = std::collections::HashMap::new();
        matched.insert("a.yaml".to_string(), 1);
        matched.insert("b.yaml".to_string(), 1);
        let (issues, num_missing) = validate_cardinality(&reference, &matched);
        assert_eq!(num_missing, 0);
        assert_eq!(issues["part"]["component"].msg, "Should only match one but matched");
    }

    #[test]
    fn any_of_never_reports() {
        let reference = reference_with(Cardinality::AnyOf, &["a.yaml"]);
        let matched = std::collections::HashMap::new();
        let (issues, num_missing) = validate_cardinality(&reference, &matched);
        assert_eq!(num_missing, 0);
        assert!(issues.is_empty());
    }

    #[test]
    fn exit_code_is_zero_when_clean() {
        let summary = Summary::default();
        assert_eq!(exit_code(&summary, &[]), 0);
    }

    #[test]
    fn exit_code_is_one_on_drift() {
        let summary = Summary::default();
        let diff = DiffSum {
            cr_name: "demo".to_string(),
            correlated_template: Some("a.yaml".to_string()),
            diff_output: "- replicas: 3\n+ replicas: 5\n".to_string(),
            patched: false,
            override_reasons: Vec::new(),
            description: None,
            warnings: Vec::new(),
        };
        assert_eq!(exit_code(&summary, std::slice::from_ref(&diff)), 1);
    }

    fn deployment_template(source: &str) -> Template {
        Template {
            path: "deploy.yaml".to_string(),
            description: None,
            source: source.to_string(),
            config: TemplateConfig::default(),
            metadata: None,
        }
    }

    fn single_template_reference(template: Template, fields_to_omit: clustercompare_core::FieldsToOmit) -> Reference {
        Reference {
            version: ReferenceVersion::V2,
            parts: vec![Part {
                name: "part".to_string(),
                description: None,
                components: vec![Component {
                    name: "component".to_string(),
                    description: None,
                    cardinality: Cardinality::AllOf,
                    templates: vec![template],
                }],
            }],
            template_function_files: Vec::new(),
            fields_to_omit,
        }
    }

    fn exact_pair_correlator(cr: &ClusterResource, template_path: &str) -> Correlator {
        let mut pairs = std::collections::HashMap::new();
        pairs.insert(cr.correlation_id(), template_path.to_string());
        Correlator::ExactPair(crate::correlate::ExactPairCorrelator::new(pairs))
    }

    /// End-to-end: render the template against the CR, reconcile a
    /// capturegroup field, strip the built-in omissions, and confirm the
    /// two sides end up textually identical.
    #[tokio::test]
    async fn compare_one_renders_reconciles_and_omits_before_diffing() {
        let source = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ metadata.name }}
  namespace: {{ metadata.namespace }}
spec:
  replicas: 3
  image: "myimage:(?<tag>[a-z0-9.]+)"
"#;
        let mut template = deployment_template(source);
        template.config.per_field = vec![clustercompare_core::PerFieldConfig {
            path_to_key: clustercompare_core::Path::parse("spec.image").unwrap(),
            inline_diff_func: clustercompare_core::InlineDiffFunc::Capturegroups,
        }];

        let cr = ClusterResource::from_value(serde_json::json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "demo", "namespace": "default", "resourceVersion": "12345"},
            "spec": {"replicas": 3, "image": "myimage:1.2.3"},
        }))
        .unwrap();

        let reference = single_template_reference(template, clustercompare_core::FieldsToOmit::default());
        let correlator = exact_pair_correlator(&cr, "deploy.yaml");
        let render_engine = clustercompare_render::Engine::default();

        let diff_sum = compare_one(&reference, &correlator, &cr, &[], &["diff".into(), "-u".into()], &render_engine)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(diff_sum.diff_output, "");
        assert!(diff_sum.warnings.is_empty());
        assert_eq!(diff_sum.correlated_template.as_deref(), Some("deploy.yaml"));
    }

    #[tokio::test]
    async fn compare_one_reports_drift_when_fields_do_not_reconcile() {
        let source = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ metadata.name }}
spec:
  replicas: 3
"#;
        let template = deployment_template(source);
        let cr = ClusterResource::from_value(serde_json::json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "demo"},
            "spec": {"replicas": 5},
        }))
        .unwrap();

        let reference = single_template_reference(template, clustercompare_core::FieldsToOmit::default());
        let correlator = exact_pair_correlator(&cr, "deploy.yaml");
        let render_engine = clustercompare_render::Engine::default();

        let diff_sum = compare_one(&reference, &correlator, &cr, &[], &["diff".into(), "-u".into()], &render_engine)
            .await
            .unwrap()
            .unwrap();

        assert!(!diff_sum.diff_output.is_empty());
    }
}
