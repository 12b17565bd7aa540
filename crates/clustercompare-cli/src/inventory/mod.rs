//! `ClusterInventory` sources the CLI wires up (§4.K): static
//! file/directory/stdin manifests, and a live `kube`-backed cluster.

pub mod live;
pub mod static_source;

pub use live::LiveClusterInventory;
