//! The `ClusterInventory` abstraction shared by the template renderer's
//! `lookupCR(s)` functions and the comparison driver's CR input stream
//! (§4.K).

/// A read-only view over the set of cluster resources a comparison run is
/// working against. Every source of CRs — manifest files, a directory
/// walk, stdin, or a live `kube` client — implements this one trait so
/// downstream code is agnostic to provenance.
pub trait ClusterInventory: Send + Sync {
    /// All resources currently known to the inventory.
    fn all_resources(&self) -> Vec<serde_json::Value>;

    /// Resources matching `api_version`/`kind`, and optionally `namespace`
    /// and `name` (`""` or `"*"` mean "any").
    fn lookup(&self, api_version: &str, kind: &str, namespace: &str, name: &str) -> Vec<serde_json::Value> {
        let is_wildcard = |s: &str| s.is_empty() || s == "*";
        self.all_resources()
            .into_iter()
            .filter(|r| {
                let matches_gvk = r.get("apiVersion").and_then(|v| v.as_str()) == Some(api_version)
                    && r.get("kind").and_then(|v| v.as_str()) == Some(kind);
                let matches_ns = is_wildcard(namespace)
                    || r.pointer("/metadata/namespace").and_then(|v| v.as_str()) == Some(namespace);
                let matches_name =
                    is_wildcard(name) || r.pointer("/metadata/name").and_then(|v| v.as_str()) == Some(name);
                matches_gvk && matches_ns && matches_name
            })
            .collect()
    }
}

/// A [`ClusterInventory`] over no resources.
#[derive(Debug, Default)]
pub struct EmptyInventory;

impl ClusterInventory for EmptyInventory {
    fn all_resources(&self) -> Vec<serde_json::Value> {
        Vec::new()
    }
}

/// An in-memory [`ClusterInventory`] built from a fixed list of resources,
/// used by the file-based CR source and by tests.
#[derive(Debug, Default, Clone)]
pub struct StaticInventory {
    resources: Vec<serde_json::Value>,
}

impl StaticInventory {
    #[must_use]
    pub fn new(resources: Vec<serde_json::Value>) -> Self {
        Self { resources }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }
}

impl ClusterInventory for StaticInventory {
    fn all_resources(&self) -> Vec<serde_json::Value> {
        self.resources.clone()
    }
}
