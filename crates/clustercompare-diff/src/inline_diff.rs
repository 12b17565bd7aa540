//! Inline-diff engine (§4.C): per-field reconciliation of a template
//! value that is itself a pattern (regex or capturegroups) against the
//! corresponding cluster value.
//!
//! The capturegroup variant: build an anchored regex and gate on a full
//! match, then substitute every capturegroup span with a distinct
//! Unicode Private-Use-Area sentinel and run a character-level diff
//! (`similar`) between the sentinel-ised pattern and the cluster value.
//! Adjacent delete/insert runs that touch a sentinel are the capture
//! candidates: the pattern side (expanded back to its real capturegroup
//! source) is compiled and matched against the value side to pull out
//! the named submatches, which are then reconciled across fields via
//! `CapturedValues`.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use similar::{capture_diff_slices, Algorithm, DiffOp};

use crate::error::{InlineDiffError, Result};

/// Capture state shared across every field of one CR-vs-template
/// comparison (§3 Design Notes: "cross-field shared capture state").
#[derive(Debug, Default, Clone)]
pub struct CapturedValues {
    seen: IndexMap<String, IndexSet<String>>,
    warned: HashSet<String>,
}

impl CapturedValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation of `name` = `value`. Returns a warning line
    /// the first time (and only the first time) this name accumulates a
    /// second distinct value.
    pub fn record(&mut self, name: &str, value: &str) -> Option<String> {
        let set = self.seen.entry(name.to_string()).or_default();
        set.insert(value.to_string());
        if set.len() > 1 && self.warned.insert(name.to_string()) {
            let values = set.iter().cloned().collect::<Vec<_>>().join(" | ");
            Some(format!("WARNING: Capturegroup (?<{}>…) matched multiple values: « {} »", name, values))
        } else {
            None
        }
    }

    #[must_use]
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.seen.get(name).and_then(|s| s.first()).map(|s| s.as_str())
    }

    /// Whether `name` has accumulated more than one distinct value so far.
    #[must_use]
    pub fn is_ambiguous(&self, name: &str) -> bool {
        self.seen.get(name).is_some_and(|s| s.len() > 1)
    }
}

/// The outcome of reconciling one field's pattern against the cluster
/// value.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// The template-side text to use in the textual diff: the cluster
    /// value itself on a match, or the original pattern on a mismatch.
    pub reconciled_value: String,
    pub matched: bool,
    pub warnings: Vec<String>,
}

/// Regex variant (§4.C): the template value is a regular expression; the
/// cluster value must match it.
pub fn reconcile_regex(pattern: &str, cluster_value: &str) -> Result<Reconciled> {
    let re = regex::Regex::new(pattern)
        .map_err(|e| InlineDiffError::InvalidPattern { pattern: pattern.to_string(), reason: e.to_string() })?;
    if re.is_match(cluster_value) {
        Ok(Reconciled { reconciled_value: cluster_value.to_string(), matched: true, warnings: Vec::new() })
    } else {
        Ok(Reconciled { reconciled_value: pattern.to_string(), matched: false, warnings: Vec::new() })
    }
}

/// One `(?<name>...)` span found in a pattern, as byte offsets into the
/// original pattern string (the span covers the whole `(?<name>...)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturegroupSpan {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// Walk `pattern` and index every top-level capturegroup span, respecting
/// backslash escaping, `[...]` character classes, and nested parentheses.
pub fn find_capturegroup_spans(pattern: &str) -> Result<Vec<CapturegroupSpan>> {
    let bytes = pattern.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    let mut in_class = false;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'[' if !in_class => {
                in_class = true;
                i += 1;
                continue;
            }
            b']' if in_class => {
                in_class = false;
                i += 1;
                continue;
            }
            b'(' if !in_class && pattern[i..].starts_with("(?<") => {
                let name_start = i + 3;
                let name_end = pattern[name_start..]
                    .find('>')
                    .map(|p| name_start + p)
                    .ok_or_else(|| InlineDiffError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: "unterminated capturegroup name".to_string(),
                    })?;
                let name = &pattern[name_start..name_end];
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(InlineDiffError::InvalidCapturegroupName { name: name.to_string() }.into());
                }

                let end = find_matching_paren(bytes, i)?;
                spans.push(CapturegroupSpan { name: name.to_string(), start: i, end: end + 1 });
                i = end + 1;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    Ok(spans)
}

fn find_matching_paren(bytes: &[u8], open: usize) -> Result<usize> {
    let mut depth = 0usize;
    let mut in_class = false;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'(' if !in_class => depth += 1,
            b')' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(InlineDiffError::InvalidPattern {
        pattern: String::from_utf8_lossy(bytes).to_string(),
        reason: "unbalanced parentheses in capturegroup pattern".to_string(),
    }
    .into())
}

/// Build an anchored regex from `pattern`: non-capture spans are
/// `regex::escape`d, capturegroup spans are kept verbatim (translated to
/// Rust's `(?P<name>...)` syntax). `^`/`$` are added when a capturegroup
/// begins or ends the pattern, `\b` is added around a capturegroup that
/// sits directly next to a literal space, and `quote_escape_full` forces
/// both anchors regardless of where the capturegroups fall.
fn build_anchored_regex(pattern: &str, spans: &[CapturegroupSpan], quote_escape_full: bool) -> Result<regex::Regex> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut cursor = 0;
    let bytes = pattern.as_bytes();

    let begins_with_capture = spans.first().is_some_and(|s| s.start == 0);
    let ends_with_capture = spans.last().is_some_and(|s| s.end == pattern.len());

    if quote_escape_full || begins_with_capture {
        out.push('^');
    }

    for span in spans {
        if span.start > cursor {
            out.push_str(&regex::escape(&pattern[cursor..span.start]));
        }
        if span.start > 0 && bytes[span.start - 1] == b' ' {
            out.push_str(r"\b");
        }
        let body = &pattern[span.start..span.end];
        out.push_str("(?P<");
        out.push_str(&span.name);
        out.push('>');
        out.push_str(&body[span.name.len() + 4..body.len() - 1]);
        out.push(')');
        if span.end < pattern.len() && bytes[span.end] == b' ' {
            out.push_str(r"\b");
        }
        cursor = span.end;
    }
    if cursor < pattern.len() {
        out.push_str(&regex::escape(&pattern[cursor..]));
    }
    if quote_escape_full || ends_with_capture {
        out.push('$');
    }

    regex::Regex::new(&out).map_err(|e| InlineDiffError::InvalidPattern { pattern: pattern.to_string(), reason: e.to_string() }.into())
}

/// Replace every capturegroup span in `pattern` with a distinct
/// codepoint from the Unicode Private-Use-Area, so the character-level
/// diff never splits a capturegroup's boundary across two ops.
const PUA_BASE: u32 = 0xE000;

fn sentinel_char(index: usize) -> char {
    char::from_u32(PUA_BASE + index as u32).unwrap_or('\u{E000}')
}

fn sentinelize(pattern: &str, spans: &[CapturegroupSpan]) -> (String, HashMap<char, CapturegroupSpan>) {
    let mut out = String::with_capacity(pattern.len());
    let mut sentinels = HashMap::new();
    let mut cursor = 0;
    for (i, span) in spans.iter().enumerate() {
        out.push_str(&pattern[cursor..span.start]);
        let sentinel = sentinel_char(i);
        out.push(sentinel);
        sentinels.insert(sentinel, span.clone());
        cursor = span.end;
    }
    out.push_str(&pattern[cursor..]);
    (out, sentinels)
}

/// Expand a sentinel-bearing slice of the sentinel-ised pattern back
/// into a regex source: literal characters are `regex::escape`d, each
/// sentinel is expanded back to its original `(?P<name>...)` source.
fn regex_source_for_slice(slice: &str, sentinels: &HashMap<char, CapturegroupSpan>, pattern: &str) -> String {
    let mut out = String::new();
    for ch in slice.chars() {
        if let Some(span) = sentinels.get(&ch) {
            let body = &pattern[span.start..span.end];
            let inner = &body[span.name.len() + 4..body.len() - 1];
            out.push_str("(?P<");
            out.push_str(&span.name);
            out.push('>');
            out.push_str(inner);
            out.push(')');
        } else {
            out.push_str(&regex::escape(&ch.to_string()));
        }
    }
    out
}

/// A contiguous delete-then-insert (or insert-then-delete) region of the
/// character-level diff, normalised from whatever mix of `Replace` and
/// adjacent `Delete`/`Insert` ops the diff produced.
struct ReplaceRegion {
    old_index: usize,
    old_len: usize,
    new_index: usize,
    new_len: usize,
}

fn replace_regions(ops: &[DiffOp]) -> Vec<ReplaceRegion> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < ops.len() {
        match ops[i] {
            DiffOp::Replace { old_index, old_len, new_index, new_len } => {
                out.push(ReplaceRegion { old_index, old_len, new_index, new_len });
                i += 1;
            }
            DiffOp::Delete { old_index, old_len, .. } => {
                if let Some(&DiffOp::Insert { new_index, new_len, .. }) = ops.get(i + 1) {
                    out.push(ReplaceRegion { old_index, old_len, new_index, new_len });
                    i += 2;
                } else {
                    i += 1;
                }
            }
            DiffOp::Insert { new_index, new_len, .. } => {
                if let Some(&DiffOp::Delete { old_index, old_len, .. }) = ops.get(i + 1) {
                    out.push(ReplaceRegion { old_index, old_len, new_index, new_len });
                    i += 2;
                } else {
                    i += 1;
                }
            }
            DiffOp::Equal { .. } => {
                i += 1;
            }
        }
    }
    out
}

/// Capturegroup variant (§4.C): extract named submatches from
/// `cluster_value`, reconcile them into `captured`, and produce the
/// template-side text for the textual diff.
pub fn reconcile_capturegroups(pattern: &str, cluster_value: &str, captured: &mut CapturedValues) -> Result<Reconciled> {
    let spans = find_capturegroup_spans(pattern)?;
    if spans.is_empty() {
        return reconcile_regex(pattern, cluster_value);
    }

    let anchored = build_anchored_regex(pattern, &spans, false)?;
    if !anchored.is_match(cluster_value) {
        return Ok(Reconciled { reconciled_value: pattern.to_string(), matched: false, warnings: Vec::new() });
    }

    let (sentinelized, sentinels) = sentinelize(pattern, &spans);
    let old_chars: Vec<char> = sentinelized.chars().collect();
    let new_chars: Vec<char> = cluster_value.chars().collect();
    let ops = capture_diff_slices(Algorithm::Myers, &old_chars, &new_chars);

    let mut local_values: IndexMap<String, String> = IndexMap::new();
    for region in replace_regions(&ops) {
        let old_slice: String = old_chars[region.old_index..region.old_index + region.old_len].iter().collect();
        if !old_slice.chars().any(|c| sentinels.contains_key(&c)) {
            continue;
        }
        let new_slice: String = new_chars[region.new_index..region.new_index + region.new_len].iter().collect();
        let regex_src = format!("^{}$", regex_source_for_slice(&old_slice, &sentinels, pattern));
        let Ok(re) = regex::Regex::new(&regex_src) else { continue };
        let Some(caps) = re.captures(&new_slice) else { continue };
        for span in &spans {
            if let Some(m) = caps.name(&span.name) {
                local_values.insert(span.name.clone(), m.as_str().to_string());
            }
        }
    }

    let mut warnings = Vec::new();
    let mut out = String::with_capacity(pattern.len());
    let mut cursor = 0;
    for span in &spans {
        out.push_str(&pattern[cursor..span.start]);
        let value = local_values.get(span.name.as_str()).cloned().unwrap_or_default();
        if let Some(w) = captured.record(&span.name, &value) {
            warnings.push(w);
        }
        if captured.is_ambiguous(&span.name) {
            let first = captured.first_value(&span.name).unwrap_or(&value).to_string();
            out.push_str(&format!("(?<{}>={})", span.name, first));
        } else {
            out.push_str(&value);
        }
        cursor = span.end;
    }
    out.push_str(&pattern[cursor..]);

    Ok(Reconciled { reconciled_value: out, matched: true, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_variant_matches_and_reconciles() {
        let r = reconcile_regex(r"^nginx-\d+$", "nginx-123").unwrap();
        assert!(r.matched);
        assert_eq!(r.reconciled_value, "nginx-123");
    }

    #[test]
    fn regex_variant_leaves_pattern_on_mismatch() {
        let r = reconcile_regex(r"^nginx-\d+$", "apache-123").unwrap();
        assert!(!r.matched);
        assert_eq!(r.reconciled_value, r"^nginx-\d+$");
    }

    #[test]
    fn finds_single_capturegroup_span() {
        let spans = find_capturegroup_spans(r"image:(?<tag>[a-z0-9.]+)").unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "tag");
    }

    #[test]
    fn capturegroup_variant_extracts_and_reconciles() {
        let mut captured = CapturedValues::new();
        let r = reconcile_capturegroups(r"image:(?<tag>[a-z0-9.]+)", "image:1.2.3", &mut captured).unwrap();
        assert!(r.matched);
        assert_eq!(r.reconciled_value, "image:1.2.3");
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn capturegroup_variant_extracts_two_adjacent_fields() {
        let mut captured = CapturedValues::new();
        let r = reconcile_capturegroups(
            r"(?<host>[a-z.]+):(?<port>\d+)",
            "example.com:8080",
            &mut captured,
        )
        .unwrap();
        assert!(r.matched);
        assert_eq!(r.reconciled_value, "example.com:8080");
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn consistent_cross_field_capture_emits_no_warning() {
        let mut captured = CapturedValues::new();
        reconcile_capturegroups(r"(?<ver>\d+\.\d+)", "1.2", &mut captured).unwrap();
        let second = reconcile_capturegroups(r"v(?<ver>\d+\.\d+)", "v1.2", &mut captured).unwrap();
        assert!(second.warnings.is_empty());
    }

    #[test]
    fn conflicting_cross_field_capture_warns_exactly_once() {
        let mut captured = CapturedValues::new();
        reconcile_capturegroups(r"(?<ver>\d+\.\d+)", "1.2", &mut captured).unwrap();
        let second = reconcile_capturegroups(r"v(?<ver>\d+\.\d+)", "v1.3", &mut captured).unwrap();
        assert_eq!(second.warnings.len(), 1);
        assert!(second.warnings[0].contains("1.2"));
        assert!(second.warnings[0].contains("1.3"));

        let third = reconcile_capturegroups(r"rev(?<ver>\d+\.\d+)", "rev1.3", &mut captured).unwrap();
        assert!(third.warnings.is_empty(), "warning must fire exactly once per name");
    }

    #[test]
    fn rejects_invalid_capturegroup_name() {
        let err = find_capturegroup_spans("(?<bad-name>x)").unwrap_err();
        assert!(matches!(err, crate::error::DiffCrateError::InlineDiff(InlineDiffError::InvalidCapturegroupName { .. })));
    }

    #[test]
    fn anchors_capturegroup_adjacent_to_a_space_with_word_boundary() {
        let spans = find_capturegroup_spans(r"replicas (?<n>\d+) ready").unwrap();
        let re = build_anchored_regex(r"replicas (?<n>\d+) ready", &spans, false).unwrap();
        assert!(re.is_match("replicas 3 ready"));
        assert!(!re.is_match("replicas 3x ready"));
    }
}
