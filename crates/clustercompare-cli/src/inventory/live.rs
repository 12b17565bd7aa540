//! Live-cluster `ClusterInventory` backed by `kube` server-side
//! discovery (§4.K): lists every resource kind the loaded reference's
//! templates mention, or — with `--all-resources` — every kind the
//! cluster's discovery API reports.

use std::collections::HashSet;

use clustercompare_core::{ClusterInventory, Reference};
use kube::api::{Api, DynamicObject, ListParams};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiResource, Discovery};
use kube::Client;
use tracing::warn;

use crate::error::Result;

pub struct LiveClusterInventory {
    resources: Vec<serde_json::Value>,
}

impl LiveClusterInventory {
    #[tracing::instrument(skip(client, reference))]
    pub async fn discover(client: Client, reference: &Reference, all_resources: bool) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;

        let mut wanted: HashSet<(String, String)> = reference
            .templates()
            .filter_map(|t| t.metadata.as_ref())
            .filter_map(|m| {
                let api_version = m.get("apiVersion").and_then(|v| v.as_str())?;
                let kind = m.get("kind").and_then(|v| v.as_str())?;
                Some((api_version.to_string(), kind.to_string()))
            })
            .collect();

        let mut resources = Vec::new();

        if all_resources {
            for group in discovery.groups() {
                for (ar, _caps) in group.recommended_resources() {
                    wanted.remove(&(group_version(&ar), ar.kind.clone()));
                    list_into(&client, &ar, &mut resources).await;
                }
            }
        }

        for (api_version, kind) in &wanted {
            let (group, version) = parse_api_version(api_version);
            let gvk = GroupVersionKind::gvk(&group, &version, kind);
            let Some((ar, _caps)) = discovery.resolve_gvk(&gvk) else {
                warn!(api_version, kind, "resource kind not found via cluster discovery, skipping");
                continue;
            };
            list_into(&client, &ar, &mut resources).await;
        }

        Ok(Self { resources })
    }
}

async fn list_into(client: &Client, ar: &ApiResource, out: &mut Vec<serde_json::Value>) {
    let api: Api<DynamicObject> = Api::all_with(client.clone(), ar);
    match api.list(&ListParams::default()).await {
        Ok(list) => out.extend(list.items.into_iter().filter_map(|o| serde_json::to_value(&o).ok())),
        Err(e) => warn!(kind = %ar.kind, error = %e, "failed to list resources for kind"),
    }
}

fn group_version(ar: &ApiResource) -> String {
    if ar.group.is_empty() {
        ar.version.clone()
    } else {
        format!("{}/{}", ar.group, ar.version)
    }
}

fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

impl ClusterInventory for LiveClusterInventory {
    fn all_resources(&self) -> Vec<serde_json::Value> {
        self.resources.clone()
    }
}
