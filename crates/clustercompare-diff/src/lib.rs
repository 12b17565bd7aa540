//! Correlator chain, inline-diff engine, override engine, comparison
//! driver, and reporter.

pub mod correlate;
pub mod driver;
pub mod error;
pub mod inline_diff;
pub mod overrides;
pub mod report;

pub use correlate::{Correlator, CorrelateOutcome, ExactPairCorrelator, FieldGroupCorrelator, Metrics};
pub use driver::{exit_code, run, DriverOptions, DriverOutput};
pub use error::{CorrelateError, DiffCrateError, InlineDiffError, OverrideError, Result};
pub use inline_diff::{reconcile_capturegroups, reconcile_regex, CapturedValues, CapturegroupSpan, Reconciled};
pub use overrides::{apply_patch, generate_skeleton_override, strategic_merge, PatchType, UserOverride};
pub use report::{render_human, render_json, render_junit, render_patch_bundle, render_yaml, OutputFormat};
