//! Core data model, path accessor, and field-omission engine shared by
//! every clustercompare crate.
//!
//! - [`path`] — dotted-path parsing and get/set/remove (component A).
//! - [`omit`] — named omission-set resolution and application (component B).
//! - [`model`] — Reference/Part/Component/Template/CR/DiffSum/Summary (§3).
//! - [`hash`] — MetadataHash computation (§3, §8).
//! - [`inventory`] — the `ClusterInventory` abstraction shared by the
//!   renderer's `lookupCR(s)` and the driver's CR stream (§4.K).

pub mod error;
pub mod hash;
pub mod inventory;
pub mod model;
pub mod omit;
pub mod path;

pub use error::{CoreError, Result};
pub use inventory::{ClusterInventory, EmptyInventory, StaticInventory};
pub use model::{
    Cardinality, ClusterResource, Component, DiffSum, InlineDiffFunc, Part, PerFieldConfig,
    Reference, ReferenceVersion, Summary, Template, TemplateConfig, ValidationIssue,
};
pub use omit::{FieldsToOmit, OmitEntry, ResolvedOmitPath, BUILT_IN_SET};
pub use path::Path;
