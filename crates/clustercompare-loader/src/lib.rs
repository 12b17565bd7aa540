//! Reference-bundle loading: parses the v1/v2 metadata dialects,
//! validates cardinality and field-omission references, renders each
//! template's empty-parameter metadata, and computes the bundle's
//! MetadataHash (§4.D).

pub mod dialect;
pub mod error;
pub mod load;

pub use error::{LoaderError, Result};
pub use load::load_reference;
