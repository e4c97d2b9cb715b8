//! Core entry point: raw source grids in, stable agent records out.
//!
//! `reconcile` is a pure function of its inputs and options. It owns no
//! shared state, so concurrent callers need no coordination.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ReconcileOptions;
use crate::error::{PipelineError, Result};
use crate::grid::Grid;
use crate::merge::{self, Coverage};
use crate::projection::{project, AgentRecord};
use crate::sources::{self, SourceKind, SourceTable};
use crate::trace::{Diagnostic, Trace};

/// A source as handed over by the collaborator that read it
#[derive(Debug, Clone, PartialEq)]
pub enum TabularInput {
    Grid(Grid),
    /// The collaborator could not turn the input into rows and columns
    Unreadable { reason: String },
}

impl From<Grid> for TabularInput {
    fn from(grid: Grid) -> Self {
        TabularInput::Grid(grid)
    }
}

/// Supplied sources, at most one per kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSet {
    inputs: BTreeMap<SourceKind, TabularInput>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: SourceKind, input: impl Into<TabularInput>) -> Self {
        self.insert(kind, input);
        self
    }

    /// Add a source; a second input of the same kind replaces the first
    pub fn insert(&mut self, kind: SourceKind, input: impl Into<TabularInput>) {
        self.inputs.insert(kind, input.into());
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceKind, &TabularInput)> {
        self.inputs.iter().map(|(kind, input)| (*kind, input))
    }
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub agents: BTreeMap<String, AgentRecord>,
    pub coverage: Coverage,
    /// Sources that contributed to the merge, in merge order
    pub processed: Vec<SourceKind>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn reconcile(inputs: &SourceSet, options: &ReconcileOptions) -> Result<Reconciliation> {
    if inputs.is_empty() {
        return Err(PipelineError::NoInputProvided);
    }

    let mut trace = Trace::new();
    let mut failures = Vec::new();
    let mut tables: Vec<SourceTable> = Vec::new();

    for (kind, input) in inputs.iter() {
        let extracted = match input {
            TabularInput::Grid(grid) => sources::extract(kind, grid, options, &mut trace),
            TabularInput::Unreadable { reason } => Err(PipelineError::MalformedSource {
                kind,
                reason: reason.clone(),
            }),
        };
        match extracted {
            Ok(table) => tables.push(table.normalize_identities(&mut trace)),
            Err(err) => {
                trace.record(Diagnostic::MalformedSource {
                    source: kind,
                    reason: malformed_reason(&err),
                });
                failures.push(err);
            }
        }
    }

    if tables.is_empty() {
        return Err(PipelineError::AllSourcesMalformed { failures });
    }

    let processed = tables.iter().map(|t| t.kind).collect();
    let merged = merge::merge(tables, &mut trace);

    Ok(Reconciliation {
        agents: project(&merged),
        coverage: Coverage::from_records(&merged),
        processed,
        diagnostics: trace.into_entries(),
    })
}

fn malformed_reason(err: &PipelineError) -> String {
    match err {
        PipelineError::MalformedSource { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}
