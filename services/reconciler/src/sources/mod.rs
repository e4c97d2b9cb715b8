//! Source extractors: one per known report shape.
//!
//! Each extractor turns a raw [`Grid`] into a [`SourceTable`] of typed records
//! through explicit stages (header promotion, column drops, forward fill,
//! garbage purge, column resolution, value cleaning). Every stage produces a
//! new table and records what it did in the [`Trace`].

pub mod all_leads;
pub mod class_consumption;
pub mod fixed_rate;
pub mod referral;
pub mod upgrade_rate;

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::columns::{self, FieldRule};
use crate::config::ReconcileOptions;
use crate::error::{PipelineError, Result};
use crate::grid::{Cell, Grid, Table};
use crate::identity;
use crate::trace::{Diagnostic, Trace};
use crate::value::clean_numeric;

pub use all_leads::{AllLeadsRecord, UnrecoveredLead};
pub use class_consumption::ClassConsumptionRecord;
pub use fixed_rate::FixedRateRecord;
pub use referral::ReferralRecord;
pub use upgrade_rate::UpgradeRateRecord;

/// The five known report shapes, in merge priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ClassConsumption,
    UpgradeRate,
    Referral,
    FixedRate,
    AllLeads,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::ClassConsumption,
        SourceKind::UpgradeRate,
        SourceKind::Referral,
        SourceKind::FixedRate,
        SourceKind::AllLeads,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ClassConsumption => "class_consumption",
            SourceKind::UpgradeRate => "upgrade_rate",
            SourceKind::Referral => "referral",
            SourceKind::FixedRate => "fixed_rate",
            SourceKind::AllLeads => "all_leads",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a row was removed before column resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeReason {
    /// Identity contains "total"
    TotalIdentity,
    /// Identity repeats a header label ("Name", "Agent Name", ...)
    HeaderLabel,
    /// One of the leading columns contains "total"
    TotalInLeadingColumns,
    /// Identity is missing
    BlankIdentity,
    /// Grouping column is purely numeric (subtotal block artifact)
    NumericGrouping,
    /// Grouping column is missing
    BlankGrouping,
    /// Placeholder identity such as "-" or "Sub Total"
    Placeholder,
    /// Identity starts with a summary word (total, sum, average, ...)
    SummaryPrefix,
    /// Subgroup outside the configured region prefix
    OutsideRegion,
}

impl PurgeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurgeReason::TotalIdentity => "total_identity",
            PurgeReason::HeaderLabel => "header_label",
            PurgeReason::TotalInLeadingColumns => "total_in_leading_columns",
            PurgeReason::BlankIdentity => "blank_identity",
            PurgeReason::NumericGrouping => "numeric_grouping",
            PurgeReason::BlankGrouping => "blank_grouping",
            PurgeReason::Placeholder => "placeholder",
            PurgeReason::SummaryPrefix => "summary_prefix",
            PurgeReason::OutsideRegion => "outside_region",
        }
    }
}

impl fmt::Display for PurgeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One agent's partial attribute set from one source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    ClassConsumption(ClassConsumptionRecord),
    UpgradeRate(UpgradeRateRecord),
    Referral(ReferralRecord),
    FixedRate(FixedRateRecord),
    AllLeads(AllLeadsRecord),
}

impl SourceRecord {
    pub fn identity(&self) -> &str {
        match self {
            SourceRecord::ClassConsumption(r) => &r.identity,
            SourceRecord::UpgradeRate(r) => &r.identity,
            SourceRecord::Referral(r) => &r.identity,
            SourceRecord::FixedRate(r) => &r.identity,
            SourceRecord::AllLeads(r) => &r.identity,
        }
    }

    fn identity_mut(&mut self) -> &mut String {
        match self {
            SourceRecord::ClassConsumption(r) => &mut r.identity,
            SourceRecord::UpgradeRate(r) => &mut r.identity,
            SourceRecord::Referral(r) => &mut r.identity,
            SourceRecord::FixedRate(r) => &mut r.identity,
            SourceRecord::AllLeads(r) => &mut r.identity,
        }
    }
}

/// Clean entity list of one source, in sheet order
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub kind: SourceKind,
    pub records: Vec<SourceRecord>,
}

impl SourceTable {
    pub fn empty(kind: SourceKind) -> Self {
        Self {
            kind,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Normalize every identity; records whose identity normalizes to an
    /// already seen key are dropped (first wins), as are blank identities.
    pub fn normalize_identities(self, trace: &mut Trace) -> SourceTable {
        let kind = self.kind;
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(self.records.len());
        for mut record in self.records {
            let key = identity::normalize(record.identity());
            if key.is_empty() {
                continue;
            }
            if !seen.insert(key.clone()) {
                trace.record(Diagnostic::DuplicateIdentity {
                    source: kind,
                    identity: key,
                });
                continue;
            }
            *record.identity_mut() = key;
            records.push(record);
        }
        SourceTable { kind, records }
    }
}

/// Run the extractor for `kind` over `grid`
pub fn extract(
    kind: SourceKind,
    grid: &Grid,
    options: &ReconcileOptions,
    trace: &mut Trace,
) -> Result<SourceTable> {
    let table = match kind {
        SourceKind::ClassConsumption => class_consumption::extract(grid, trace)?,
        SourceKind::UpgradeRate => upgrade_rate::extract(grid, trace)?,
        SourceKind::Referral => referral::extract(grid, options, trace)?,
        SourceKind::FixedRate => fixed_rate::extract(grid, trace)?,
        SourceKind::AllLeads => all_leads::extract(grid, options, trace)?,
    };
    trace.record(Diagnostic::SourceExtracted {
        source: kind,
        records: table.len(),
    });
    Ok(table)
}

// =============================================================================
// Shared stages
// =============================================================================

/// Promote raw row `header_row` to headers, discarding the rows above it and
/// `skip_after_header` rows below it
pub(crate) fn promote_header(
    kind: SourceKind,
    grid: &Grid,
    header_row: usize,
    skip_after_header: usize,
    trace: &mut Trace,
) -> Result<Table> {
    if grid.width() == 0 {
        return Err(PipelineError::MalformedSource {
            kind,
            reason: "sheet has no cells".to_string(),
        });
    }
    let table = Table::from_grid(grid, header_row, skip_after_header).ok_or_else(|| {
        PipelineError::MalformedSource {
            kind,
            reason: format!(
                "sheet has {} rows, header expected at row {}",
                grid.row_count(),
                header_row
            ),
        }
    })?;
    trace.record(Diagnostic::HeaderPromoted {
        source: kind,
        row: header_row,
        columns: table.width(),
    });
    Ok(table)
}

/// Drop columns matching `drop`, recording how many went
pub(crate) fn drop_columns<F>(kind: SourceKind, table: &Table, drop: F, trace: &mut Trace) -> Table
where
    F: Fn(&str) -> bool,
{
    let (table, count) = table.drop_columns(drop);
    if count > 0 {
        trace.record(Diagnostic::ColumnsDropped {
            source: kind,
            count,
        });
    }
    table
}

/// Keep rows satisfying `keep`; removed rows are recorded under `reason`
pub(crate) fn purge<F>(
    kind: SourceKind,
    table: &Table,
    reason: PurgeReason,
    keep: F,
    trace: &mut Trace,
) -> Table
where
    F: Fn(&[Cell]) -> bool,
{
    let (table, count) = table.retain_rows(keep);
    if count > 0 {
        trace.record(Diagnostic::RowsPurged {
            source: kind,
            reason,
            count,
        });
    }
    table
}

/// Resolve one field, recording the outcome
pub(crate) fn resolve_field(
    kind: SourceKind,
    table: &Table,
    rule: &FieldRule,
    trace: &mut Trace,
) -> Option<usize> {
    let resolved = columns::resolve(table, rule);
    match resolved {
        Some(idx) => trace.record(Diagnostic::ColumnResolved {
            source: kind,
            field: rule.field,
            header: table.headers()[idx].clone(),
        }),
        None => trace.record(Diagnostic::FieldNotResolved {
            source: kind,
            field: rule.field,
        }),
    }
    resolved
}

/// Trimmed text of an optional column
pub(crate) fn text_at(table: &Table, row: usize, col: Option<usize>) -> Option<String> {
    col.and_then(|c| table.cell(row, c).as_text())
}

/// Cleaned number of an optional column
pub(crate) fn number_at(table: &Table, row: usize, col: Option<usize>) -> Option<f64> {
    col.and_then(|c| clean_numeric(table.cell(row, c)))
}

/// Case-insensitive "contains total" test on a cell's text
pub(crate) fn mentions_total(cell: &Cell) -> bool {
    cell.as_text()
        .map(|text| text.to_lowercase().contains("total"))
        .unwrap_or(false)
}

/// Header labels that leak into the body when report blocks are stacked
const IDENTITY_HEADER_LABELS: &[&str] = &[
    "name",
    "agent",
    "agent name",
    "cm name",
    "last cm name",
    "lp",
    "lp name",
];

fn is_header_label(cell: &Cell) -> bool {
    cell.as_text()
        .map(|name| IDENTITY_HEADER_LABELS.contains(&name.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Drop rows whose identity mentions "total"
pub(crate) fn purge_total_identity(
    kind: SourceKind,
    table: &Table,
    identity_col: usize,
    trace: &mut Trace,
) -> Table {
    purge(
        kind,
        table,
        PurgeReason::TotalIdentity,
        |row| !mentions_total(&row[identity_col]),
        trace,
    )
}

/// Drop rows whose identity repeats a header label
pub(crate) fn purge_header_labels(
    kind: SourceKind,
    table: &Table,
    identity_col: usize,
    trace: &mut Trace,
) -> Table {
    purge(
        kind,
        table,
        PurgeReason::HeaderLabel,
        |row| !is_header_label(&row[identity_col]),
        trace,
    )
}

pub(crate) fn purge_blank_identity(
    kind: SourceKind,
    table: &Table,
    identity_col: usize,
    trace: &mut Trace,
) -> Table {
    purge(
        kind,
        table,
        PurgeReason::BlankIdentity,
        |row| !row[identity_col].is_blank(),
        trace,
    )
}

/// Identity filters every extractor runs before building records:
/// subtotal rows, repeated header rows and rows without an identity
pub(crate) fn purge_identity_garbage(
    kind: SourceKind,
    table: &Table,
    identity_col: usize,
    trace: &mut Trace,
) -> Table {
    let table = purge_total_identity(kind, table, identity_col, trace);
    let table = purge_header_labels(kind, &table, identity_col, trace);
    purge_blank_identity(kind, &table, identity_col, trace)
}
