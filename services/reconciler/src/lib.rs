//! Reconciler - Merges per-agent operational reports into one record per agent
//!
//! Responsibilities:
//! - Load spreadsheet/CSV exports into raw grids with content fingerprints
//! - Promote headers and purge summary/garbage rows per report shape
//! - Resolve columns heuristically from messy, multi-language headers
//! - Normalize identities and outer-join the reports on them
//! - Project every agent onto a fixed output schema
//! - Record every decision as a structured diagnostic
//!
//! The core (`reconcile`) is deterministic: same grids + same options = same output.

pub mod columns;
pub mod config;
pub mod error;
pub mod grid;
pub mod identity;
pub mod loader;
pub mod merge;
pub mod pipeline;
pub mod projection;
pub mod scoring;
pub mod sources;
pub mod trace;
pub mod value;

pub use config::{ReconcileOptions, Settings};
pub use error::PipelineError;
pub use grid::{Cell, Grid};
pub use merge::Coverage;
pub use pipeline::{reconcile, Reconciliation, SourceSet, TabularInput};
pub use projection::AgentRecord;
pub use sources::SourceKind;
pub use trace::Diagnostic;
