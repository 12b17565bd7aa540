//! The `compare` workflow (§4.L, §6): fetch → load → gather CRs →
//! correlate → diff → report.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use clustercompare_core::{ClusterInventory, ClusterResource, Reference};
use clustercompare_diff::{Correlator, DriverOptions, ExactPairCorrelator, FieldGroupCorrelator, UserOverride};
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::error::{CliError, Result};
use crate::inventory::{static_source, LiveClusterInventory};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Junit,
    #[value(name = "patch-yaml")]
    PatchYaml,
}

pub struct CompareArgs {
    pub reference: String,
    pub filenames: Vec<String>,
    pub recursive: bool,
    pub diff_config: Option<PathBuf>,
    pub output: Option<OutputFormatArg>,
    pub concurrency: usize,
    pub all_resources: bool,
    pub show_managed_fields: bool,
    pub overrides: Option<PathBuf>,
    pub generate_override_for: Option<String>,
    pub override_reason: Option<String>,
}

#[instrument(skip(args), fields(reference = %args.reference))]
pub async fn run(args: CompareArgs) -> Result<i32> {
    let bundle_root = clustercompare_fetch::fetch_reference(&args.reference).await?;
    let (reference, metadata_hash) = clustercompare_loader::load_reference(&bundle_root)?;
    let reference = Arc::new(reference);

    let inventory: Arc<dyn ClusterInventory> = if args.filenames.is_empty() {
        let client = kube::Client::try_default().await?;
        Arc::new(LiveClusterInventory::discover(client, &reference, args.all_resources).await?)
    } else {
        Arc::new(static_source::load(&args.filenames, args.recursive)?)
    };

    let resources = gather_resources(inventory.as_ref(), args.show_managed_fields);
    let correlator = build_correlator(&reference, args.diff_config.as_deref())?;

    if let Some(template_path) = &args.generate_override_for {
        let overrides = generate_overrides_for(&reference, &resources, &correlator, template_path, args.override_reason.as_deref())?;
        print!("{}", clustercompare_diff::render_patch_bundle(&overrides)?);
        return Ok(crate::exit_codes::SUCCESS);
    }

    let overrides = match &args.overrides {
        Some(path) => load_overrides(path)?,
        None => Vec::new(),
    };

    let render_engine: Arc<clustercompare_render::Engine<'static>> = Arc::new(clustercompare_render::Engine::new(inventory.clone()));

    let options = DriverOptions {
        concurrency: args.concurrency.max(1),
        overrides: overrides.clone(),
        external_diff_command: external_diff_command(),
        render_engine,
    };

    let output = clustercompare_diff::run(reference, Arc::new(correlator), resources, options, metadata_hash).await?;

    let rendered = match args.output {
        None => clustercompare_diff::render_human(&output.diffs, &output.summary, false),
        Some(OutputFormatArg::Json) => clustercompare_diff::render_json(&output.diffs, &output.summary)?,
        Some(OutputFormatArg::Yaml) => clustercompare_diff::render_yaml(&output.diffs, &output.summary)?,
        Some(OutputFormatArg::Junit) => clustercompare_diff::render_junit(&output.diffs, &output.summary),
        Some(OutputFormatArg::PatchYaml) => clustercompare_diff::render_patch_bundle(&overrides)?,
    };
    print!("{rendered}");

    Ok(clustercompare_diff::exit_code(&output.summary, &output.diffs))
}

fn gather_resources(inventory: &dyn ClusterInventory, show_managed_fields: bool) -> Vec<ClusterResource> {
    inventory
        .all_resources()
        .into_iter()
        .filter_map(|mut raw| {
            if !show_managed_fields {
                strip_managed_fields(&mut raw);
            }
            match ClusterResource::from_value(raw) {
                Ok(cr) => Some(cr),
                Err(e) => {
                    warn!(error = %e, "skipping malformed cluster resource");
                    None
                }
            }
        })
        .collect()
}

fn strip_managed_fields(value: &mut serde_json::Value) {
    if let Some(metadata) = value.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        metadata.remove("managedFields");
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DiffConfigFile {
    #[serde(default)]
    correlation_settings: Option<CorrelationSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CorrelationSettings {
    #[serde(default)]
    manual_correlation: Option<ManualCorrelation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManualCorrelation {
    #[serde(default)]
    correlation_pairs: HashMap<String, String>,
}

fn build_correlator(reference: &Reference, diff_config: Option<&Path>) -> Result<Correlator> {
    let mut chain = Vec::new();

    if let Some(path) = diff_config {
        let contents = std::fs::read_to_string(path)?;
        let config: DiffConfigFile = serde_yaml::from_str(&contents)?;
        let pairs = config.correlation_settings.and_then(|c| c.manual_correlation).map(|m| m.correlation_pairs).unwrap_or_default();
        if !pairs.is_empty() {
            chain.push(Correlator::ExactPair(ExactPairCorrelator::new(pairs)));
        }
    }

    chain.push(Correlator::FieldGroup(FieldGroupCorrelator::from_reference(reference)));
    Ok(Correlator::Chain(chain))
}

fn load_overrides(path: &Path) -> Result<Vec<UserOverride>> {
    let contents = std::fs::read_to_string(path)?;
    let overrides: Vec<UserOverride> = serde_yaml::from_str(&contents)?;
    Ok(overrides)
}

fn generate_overrides_for(
    reference: &Reference,
    resources: &[ClusterResource],
    correlator: &Correlator,
    template_path: &str,
    reason: Option<&str>,
) -> Result<Vec<UserOverride>> {
    let template = reference
        .find_template(template_path)
        .ok_or_else(|| CliError::usage(format!("no template at path '{template_path}'")))?;
    let rendered = template.metadata.clone().unwrap_or_else(|| serde_json::json!({}));

    let mut overrides = Vec::new();
    for resource in resources {
        match correlator.resolve(resource, |candidates| candidates[0].clone()) {
            Ok(path) if path == template_path => {}
            _ => continue,
        }
        let mut override_ = clustercompare_diff::generate_skeleton_override(
            template_path,
            &resource.api_version,
            &resource.kind,
            resource.namespace.as_deref(),
            &resource.name,
            &rendered,
            &resource.raw,
        );
        override_.reason = reason.map(str::to_string);
        overrides.push(override_);
    }
    Ok(overrides)
}

/// `KUBECTL_EXTERNAL_DIFF`, shell-split into program + args (§4.L, §6).
fn external_diff_command() -> Vec<String> {
    match std::env::var("KUBECTL_EXTERNAL_DIFF") {
        Ok(value) if !value.trim().is_empty() => value.split_whitespace().map(str::to_string).collect(),
        _ => vec!["diff".to_string(), "-u".to_string(), "-N".to_string()],
    }
}
