//! MetadataHash computation: SHA-256 over the canonical-YAML Reference
//! plus each template's parsed-tree node sequence (§3, §8).

use sha2::{Digest, Sha256};

/// Reduce Jinja source to a token sequence insensitive to comment text
/// and incidental whitespace: strip `{# ... #}` comments, then split on
/// whitespace runs.
pub fn template_node_sequence(source: &str) -> Vec<String> {
    let mut stripped = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{#") {
        stripped.push_str(&rest[..start]);
        match rest[start..].find("#}") {
            Some(end) => rest = &rest[start + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    stripped.push_str(rest);
    stripped.split_whitespace().map(|s| s.to_string()).collect()
}

/// Compute the stable metadata hash. `templates` is `(path, source)`
/// pairs; they are sorted by path before hashing so file order never
/// affects the result.
pub fn compute_metadata_hash(canonical_reference_yaml: &str, templates: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = templates.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    hasher.update(canonical_reference_yaml.as_bytes());
    for (path, source) in sorted {
        hasher.update(path.as_bytes());
        for token in template_node_sequence(source) {
            hasher.update(token.as_bytes());
            hasher.update(b"\0");
        }
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_insensitive_to_comment_whitespace() {
        let a = "kind: Service\n{# a comment #}\nname: frontend";
        let b = "kind: Service\n{#   a different comment entirely   #}\nname:   frontend";
        assert_eq!(template_node_sequence(a), template_node_sequence(b));
    }

    #[test]
    fn hash_is_insensitive_to_unrelated_file_order() {
        let templates_a = vec![
            ("a.yaml".to_string(), "kind: A".to_string()),
            ("b.yaml".to_string(), "kind: B".to_string()),
        ];
        let templates_b = vec![
            ("b.yaml".to_string(), "kind: B".to_string()),
            ("a.yaml".to_string(), "kind: A".to_string()),
        ];
        assert_eq!(
            compute_metadata_hash("ref", &templates_a),
            compute_metadata_hash("ref", &templates_b)
        );
    }

    #[test]
    fn hash_changes_when_a_template_changes() {
        let t1 = vec![("a.yaml".to_string(), "kind: A".to_string())];
        let t2 = vec![("a.yaml".to_string(), "kind: B".to_string())];
        assert_ne!(compute_metadata_hash("ref", &t1), compute_metadata_hash("ref", &t2));
    }
}
