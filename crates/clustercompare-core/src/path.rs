//! Dotted-path parsing and traversal over JSON trees (component A).
//!
//! Paths are CSV-style quoted: a segment wrapped in double quotes may
//! contain literal dots (used for annotation keys such as
//! `kubectl.kubernetes.io/last-applied-configuration`). A bracketed or
//! bare numeric segment selects a list index.

use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};

/// A parsed dotted path: an ordered list of raw segment strings.
///
/// Whether a segment is used as a map key or a list index is decided at
/// traversal time by the shape of the node being visited, not by the
/// parser — the same path can in principle address either, depending on
/// what tree it is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
    original: String,
}

impl Path {
    /// Parse a dotted path string.
    pub fn parse(raw: &str) -> Result<Self> {
        let tokens = split_quoted(raw)?;
        let mut segments = Vec::with_capacity(tokens.len());
        for token in tokens {
            split_bracket_index(&token, &mut segments);
        }
        Ok(Self {
            segments,
            original: raw.to_string(),
        })
    }

    /// Build a path directly from already-separated segments (no parsing).
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        let original = segments.join(".");
        Self { segments, original }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if `other` is this path or a descendant of it (prefix match).
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments.iter().zip(other.segments.iter()).all(|(a, b)| a == b)
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Split `path` on unquoted dots. A segment starting with `"` runs until
/// its closing (possibly backslash-escaped) quote.
fn split_quoted(path: &str) -> Result<Vec<String>> {
    let bytes = path.as_bytes();
    let n = bytes.len();
    let mut segments = Vec::new();
    let mut i = 0;

    while i < n {
        if bytes[i] == b'"' {
            let mut buf = String::new();
            let mut j = i + 1;
            loop {
                if j >= n {
                    return Err(CoreError::MalformedPath {
                        path: path.to_string(),
                        reason: "unterminated quoted segment".to_string(),
                    });
                }
                if bytes[j] == b'\\' && j + 1 < n {
                    buf.push(bytes[j + 1] as char);
                    j += 2;
                    continue;
                }
                if bytes[j] == b'"' {
                    j += 1;
                    break;
                }
                buf.push(bytes[j] as char);
                j += 1;
            }
            segments.push(buf);
            i = j;
            if i < n {
                if bytes[i] != b'.' {
                    return Err(CoreError::MalformedPath {
                        path: path.to_string(),
                        reason: "expected '.' after quoted segment".to_string(),
                    });
                }
                i += 1;
            }
        } else {
            let start = i;
            while i < n && bytes[i] != b'.' {
                i += 1;
            }
            segments.push(path[start..i].to_string());
            if i < n {
                i += 1;
            }
        }
    }

    if segments.is_empty() {
        segments.push(String::new());
    }
    Ok(segments)
}

/// Expand a `name[0]` style token into `name`, `0` segments; a bare
/// `[0]` token becomes a single `0` segment; anything else passes through.
fn split_bracket_index(token: &str, out: &mut Vec<String>) {
    if let Some(open) = token.find('[') {
        if token.ends_with(']') {
            let name = &token[..open];
            let index = &token[open + 1..token.len() - 1];
            if index.chars().all(|c| c.is_ascii_digit()) && !index.is_empty() {
                if !name.is_empty() {
                    out.push(name.to_string());
                }
                out.push(index.to_string());
                return;
            }
        }
    }
    out.push(token.to_string());
}

fn parse_index(path: &Path, segment: &str) -> Result<usize> {
    segment.parse::<usize>().map_err(|_| CoreError::InvalidIndex {
        path: path.as_str().to_string(),
        segment: segment.to_string(),
    })
}

/// `get(obj, path) -> (value, found)`. Traversing into a scalar is an
/// error; traversing past a missing key/index is simply "not found".
pub fn get<'a>(obj: &'a JsonValue, path: &Path) -> Result<Option<&'a JsonValue>> {
    let mut cur = obj;
    for segment in path.segments() {
        match cur {
            JsonValue::Object(map) => match map.get(segment) {
                Some(v) => cur = v,
                None => return Ok(None),
            },
            JsonValue::Array(arr) => {
                let idx = parse_index(path, segment)?;
                match arr.get(idx) {
                    Some(v) => cur = v,
                    None => return Ok(None),
                }
            }
            JsonValue::Null => return Ok(None),
            _ => {
                return Err(CoreError::BadAccessor {
                    path: path.as_str().to_string(),
                })
            }
        }
    }
    Ok(Some(cur))
}

/// `set(obj, path, value)`. Intermediate mapping segments are created as
/// needed; intermediate list segments must already exist (replacing an
/// existing index) or extend the list by exactly one slot.
pub fn set(obj: &mut JsonValue, path: &Path, value: JsonValue) -> Result<()> {
    set_rec(obj, path, path.segments(), value)
}

fn set_rec(obj: &mut JsonValue, path: &Path, segments: &[String], value: JsonValue) -> Result<()> {
    let (head, rest) = segments.split_first().expect("set() requires a non-empty path");

    if obj.is_null() {
        *obj = if head.chars().all(|c| c.is_ascii_digit()) {
            JsonValue::Array(Vec::new())
        } else {
            JsonValue::Object(serde_json::Map::new())
        };
    }

    match obj {
        JsonValue::Object(map) => {
            if rest.is_empty() {
                map.insert(head.clone(), value);
                return Ok(());
            }
            let child = map.entry(head.clone()).or_insert(JsonValue::Null);
            set_rec(child, path, rest, value)
        }
        JsonValue::Array(arr) => {
            let idx = parse_index(path, head)?;
            if rest.is_empty() {
                if idx < arr.len() {
                    arr[idx] = value;
                } else if idx == arr.len() {
                    arr.push(value);
                } else {
                    return Err(CoreError::IndexOutOfBounds {
                        path: path.as_str().to_string(),
                        index: idx,
                        len: arr.len(),
                    });
                }
                return Ok(());
            }
            if idx == arr.len() {
                arr.push(JsonValue::Null);
            }
            let child = arr.get_mut(idx).ok_or_else(|| CoreError::IndexOutOfBounds {
                path: path.as_str().to_string(),
                index: idx,
                len: arr.len(),
            })?;
            set_rec(child, path, rest, value)
        }
        _ => Err(CoreError::BadAccessor {
            path: path.as_str().to_string(),
        }),
    }
}

/// `remove(obj, path)`. Removing a trailing mapping key removes it; if
/// the parent mapping becomes empty it is removed too, recursively
/// toward the root. Lists are never backtrack-removed.
pub fn remove(obj: &mut JsonValue, path: &Path) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    remove_rec(obj, path, path.segments())?;
    Ok(())
}

/// Removes the addressed node; returns whether `obj` is now an empty
/// mapping (a signal for the caller to remove its own entry for `obj`).
fn remove_rec(obj: &mut JsonValue, path: &Path, segments: &[String]) -> Result<bool> {
    let (head, rest) = segments.split_first().expect("remove() requires a non-empty path");

    match obj {
        JsonValue::Object(map) => {
            if rest.is_empty() {
                map.remove(head);
                return Ok(map.is_empty());
            }
            if let Some(child) = map.get_mut(head) {
                let child_now_empty = remove_rec(child, path, rest)?;
                if child_now_empty && matches!(child, JsonValue::Object(m) if m.is_empty()) {
                    map.remove(head);
                }
            }
            Ok(map.is_empty())
        }
        JsonValue::Array(arr) => {
            let idx = parse_index(path, head)?;
            if rest.is_empty() {
                if idx < arr.len() {
                    arr.remove(idx);
                }
                return Ok(false);
            }
            if let Some(child) = arr.get_mut(idx) {
                remove_rec(child, path, rest)?;
            }
            Ok(false)
        }
        JsonValue::Null => Ok(false),
        _ => Err(CoreError::BadAccessor {
            path: path.as_str().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_simple_dotted_path() {
        let p = Path::parse("metadata.name").unwrap();
        assert_eq!(p.segments(), &["metadata", "name"]);
    }

    #[test]
    fn parses_bracketed_index() {
        let p = Path::parse("spec.containers[0].image").unwrap();
        assert_eq!(p.segments(), &["spec", "containers", "0", "image"]);
    }

    #[test]
    fn parses_quoted_segment_with_dots() {
        let p = Path::parse(r#"metadata.annotations."kubectl.kubernetes.io/last-applied-configuration""#).unwrap();
        assert_eq!(
            p.segments(),
            &[
                "metadata",
                "annotations",
                "kubectl.kubernetes.io/last-applied-configuration"
            ]
        );
    }

    #[test]
    fn get_traverses_maps_and_lists() {
        let obj = json!({"spec": {"containers": [{"image": "nginx"}]}});
        let p = Path::parse("spec.containers[0].image").unwrap();
        assert_eq!(get(&obj, &p).unwrap(), Some(&json!("nginx")));
    }

    #[test]
    fn get_missing_key_is_not_found_not_error() {
        let obj = json!({"spec": {}});
        let p = Path::parse("spec.replicas").unwrap();
        assert_eq!(get(&obj, &p).unwrap(), None);
    }

    #[test]
    fn get_into_scalar_is_bad_accessor() {
        let obj = json!({"spec": "not-a-map"});
        let p = Path::parse("spec.replicas").unwrap();
        assert!(matches!(get(&obj, &p), Err(CoreError::BadAccessor { .. })));
    }

    #[test]
    fn remove_cleans_up_empty_parent_mappings() {
        let mut obj = json!({"metadata": {"annotations": {"a": "b"}}});
        let p = Path::parse("metadata.annotations.a").unwrap();
        remove(&mut obj, &p).unwrap();
        assert_eq!(obj, json!({}));
    }

    #[test]
    fn remove_does_not_bubble_through_lists() {
        let mut obj = json!({"items": [{"a": "b"}]});
        let p = Path::parse("items[0].a").unwrap();
        remove(&mut obj, &p).unwrap();
        assert_eq!(obj, json!({"items": [{}]}));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut obj = json!({"metadata": {"annotations": {"a": "b"}, "name": "x"}});
        let p = Path::parse("metadata.annotations.a").unwrap();
        let mut once = obj.clone();
        remove(&mut once, &p).unwrap();
        remove(&mut obj, &p).unwrap();
        remove(&mut obj, &p).unwrap();
        assert_eq!(obj, once);
    }

    #[test]
    fn set_creates_intermediate_mappings() {
        let mut obj = json!({});
        let p = Path::parse("spec.replicas").unwrap();
        set(&mut obj, &p, json!(3)).unwrap();
        assert_eq!(obj, json!({"spec": {"replicas": 3}}));
    }
}
