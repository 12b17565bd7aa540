//! Jinja2 template rendering: the standard helper library, cluster-aware
//! lookups, and the `Engine` that turns reference template source into
//! rendered objects (§4.E).

pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;

pub use engine::Engine;
pub use error::{EngineError, Result, TemplateError};
