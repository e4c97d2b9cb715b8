//! Pipeline error taxonomy.
//!
//! Only two conditions stop a run: nothing was supplied, or nothing supplied
//! could be read. Everything else (unresolved columns, blank identities,
//! a single unreadable source) degrades to missing data plus a diagnostic.

use thiserror::Error;

use crate::sources::SourceKind;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No source report was supplied
    #[error("no input provided: at least one source report is required")]
    NoInputProvided,

    /// One source could not be interpreted as rows and columns
    #[error("malformed {kind} source: {reason}")]
    MalformedSource { kind: SourceKind, reason: String },

    /// Every supplied source was malformed
    #[error("all supplied sources are malformed: {}", describe(.failures))]
    AllSourcesMalformed { failures: Vec<PipelineError> },
}

fn describe(failures: &[PipelineError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
