//! Reporter (§4.I): renders a `DriverOutput` as human-readable text,
//! JSON, YAML, a patch bundle, or JUnit XML.

use clustercompare_core::{DiffSum, Summary};
use console::{style, Style};

use crate::error::Result;
use crate::overrides::UserOverride;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
    PatchYaml,
    Junit,
}

/// Render the human-readable report: a separator-delimited diff block
/// per non-empty CR, followed by a colored summary.
///
/// When `show_empty_diffs` is false, CRs whose `diff_output` is empty
/// are omitted entirely.
#[must_use]
pub fn render_human(diffs: &[DiffSum], summary: &Summary, show_empty_diffs: bool) -> String {
    let mut out = String::new();

    for diff in diffs {
        if diff.is_empty_diff() && !show_empty_diffs {
            continue;
        }
        let header_style = if diff.is_empty_diff() { Style::new().dim() } else { Style::new().yellow().bold() };
        out.push_str(&format!("{}\n", header_style.apply_to(format!("=== {} ===", diff.cr_name))));
        if let Some(template) = &diff.correlated_template {
            out.push_str(&format!("template: {template}\n"));
        }
        if !diff.override_reasons.is_empty() {
            out.push_str(&format!("overrides applied: {}\n", diff.override_reasons.join("; ")));
        }
        for warning in &diff.warnings {
            out.push_str(&format!("{}\n", style(warning).red()));
        }
        out.push_str(&diff.diff_output);
        if !diff.diff_output.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str(&format!("{}\n", style("=== summary ===").bold()));
    out.push_str(&format!(
        "{} CRs compared, {} with diffs, {} patched, {} missing, {} unmatched\n",
        summary.total_crs, summary.num_diff_crs, summary.patched_crs, summary.num_missing, summary.unmatched_crs.len()
    ));
    for (part, components) in &summary.validation_issues {
        for (component, issue) in components {
            out.push_str(&format!("{}: {} / {}: {} ({})\n", style("issue").red(), part, component, issue.msg, issue.crs.join(", ")));
        }
    }

    out
}

#[derive(serde::Serialize)]
struct StructuredReport<'a> {
    diffs: &'a [DiffSum],
    summary: &'a Summary,
}

pub fn render_json(diffs: &[DiffSum], summary: &Summary) -> Result<String> {
    Ok(serde_json::to_string_pretty(&StructuredReport { diffs, summary }).map_err(clustercompare_core::CoreError::from)?)
}

pub fn render_yaml(diffs: &[DiffSum], summary: &Summary) -> Result<String> {
    Ok(serde_yaml::to_string(&StructuredReport { diffs, summary }).map_err(clustercompare_core::CoreError::from)?)
}

pub fn render_patch_bundle(overrides: &[UserOverride]) -> Result<String> {
    Ok(serde_yaml::to_string(overrides).map_err(clustercompare_core::CoreError::from)?)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

/// Hand-written JUnit XML with three suites: Detected Differences,
/// Reference Validation, Unmatched Cluster Resources, each carrying
/// `MetadataHash`/`TotalCRs` properties.
#[must_use]
pub fn render_junit(diffs: &[DiffSum], summary: &Summary) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<testsuites>\n");

    write_suite(
        &mut out,
        "Detected Differences",
        summary,
        diffs.iter().map(|d| (d.cr_name.as_str(), d.is_empty_diff(), d.diff_output.as_str())),
    );

    let validation_cases: Vec<(String, bool, String)> = summary
        .validation_issues
        .iter()
        .flat_map(|(part, components)| {
            components.iter().map(move |(component, issue)| {
                (format!("{part}/{component}"), false, format!("{}: {}", issue.msg, issue.crs.join(", ")))
            })
        })
        .collect();
    write_suite(
        &mut out,
        "Reference Validation",
        summary,
        validation_cases.iter().map(|(name, passed, msg)| (name.as_str(), *passed, msg.as_str())),
    );

    let unmatched_cases: Vec<(String, bool, String)> =
        summary.unmatched_crs.iter().map(|cr| (cr.clone(), false, "unmatched cluster resource".to_string())).collect();
    write_suite(
        &mut out,
        "Unmatched Cluster Resources",
        summary,
        unmatched_cases.iter().map(|(name, passed, msg)| (name.as_str(), *passed, msg.as_str())),
    );

    out.push_str("</testsuites>\n");
    out
}

fn write_suite<'a>(out: &mut String, name: &str, summary: &Summary, cases: impl Iterator<Item = (&'a str, bool, &'a str)>) {
    let cases: Vec<_> = cases.collect();
    let failures = cases.iter().filter(|(_, passed, _)| !passed).count();

    out.push_str(&format!(
        "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\">\n",
        xml_escape(name),
        cases.len(),
        failures
    ));
    out.push_str("    <properties>\n");
    out.push_str(&format!("      <property name=\"MetadataHash\" value=\"{}\"/>\n", xml_escape(&summary.metadata_hash)));
    out.push_str(&format!("      <property name=\"TotalCRs\" value=\"{}\"/>\n", summary.total_crs));
    out.push_str("    </properties>\n");

    for (case_name, passed, message) in cases {
        if passed {
            out.push_str(&format!("    <testcase name=\"{}\"/>\n", xml_escape(case_name)));
        } else {
            out.push_str(&format!("    <testcase name=\"{}\">\n", xml_escape(case_name)));
            out.push_str(&format!("      <failure message=\"{}\"/>\n", xml_escape(message)));
            out.push_str("    </testcase>\n");
        }
    }

    out.push_str("  </testsuite>\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff_sum(name: &str, output: &str) -> DiffSum {
        DiffSum {
            cr_name: name.to_string(),
            correlated_template: Some("deploy.yaml".to_string()),
            diff_output: output.to_string(),
            patched: false,
            override_reasons: Vec::new(),
            description: None,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn human_report_omits_empty_diffs_by_default() {
        let diffs = vec![diff_sum("a", ""), diff_sum("b", "- x\n+ y\n")];
        let summary = Summary { total_crs: 2, num_diff_crs: 1, ..Default::default() };
        let out = render_human(&diffs, &summary, false);
        assert!(!out.contains("=== a ==="));
        assert!(out.contains("=== b ==="));
    }

    #[test]
    fn human_report_shows_empty_diffs_when_requested() {
        let diffs = vec![diff_sum("a", "")];
        let summary = Summary::default();
        let out = render_human(&diffs, &summary, true);
        assert!(out.contains("=== a ==="));
    }

    #[test]
    fn junit_includes_three_suites_with_properties() {
        let diffs = vec![diff_sum("a", "- x\n+ y\n")];
        let summary = Summary { metadata_hash: "abc123".to_string(), total_crs: 1, ..Default::default() };
        let xml = render_junit(&diffs, &summary);
        assert!(xml.contains("Detected Differences"));
        assert!(xml.contains("Reference Validation"));
        assert!(xml.contains("Unmatched Cluster Resources"));
        assert!(xml.contains("MetadataHash") && xml.contains("abc123"));
    }

    #[test]
    fn json_report_round_trips_through_serde() {
        let diffs = vec![diff_sum("a", "")];
        let summary = Summary::default();
        let json = render_json(&diffs, &summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["diffs"][0]["cr_name"], serde_json::json!("a"));
    }
}
