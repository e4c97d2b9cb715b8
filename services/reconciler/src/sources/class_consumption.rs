//! Class-consumption report.
//!
//! Layout: three title rows, header on raw row 3, team and subgroup as the two
//! leftmost columns with merged cells, a `#` row-number column and subtotal
//! blocks interleaved with agent rows.

use crate::columns::{Field, FieldRule, Strategy};
use crate::error::Result;
use crate::grid::{Grid, Table};
use crate::trace::{Diagnostic, Trace};
use crate::value::is_digits;

use super::{
    drop_columns, mentions_total, number_at, promote_header, purge, purge_blank_identity,
    purge_header_labels, purge_total_identity, resolve_field, text_at, PurgeReason, SourceKind,
    SourceRecord, SourceTable,
};

const KIND: SourceKind = SourceKind::ClassConsumption;
const HEADER_ROW: usize = 3;
const TEAM_COL: usize = 0;
const SUBGROUP_COL: usize = 1;
/// Leading columns scanned for subtotal markers
const LEADING_COLUMNS: usize = 3;

const IDENTITY: FieldRule = FieldRule {
    field: Field::Identity,
    exact: &["name"],
    keywords: &["name"],
    strategy: Strategy::FirstMatch,
};

const SUPER_CLASS_CONSUMPTION: FieldRule = FieldRule {
    field: Field::SuperClassConsumptionPct,
    exact: &["m1-m4 super_class_consumption"],
    keywords: &[
        "super_class_consumption",
        "super class consumption",
        "super_class",
        "super class",
    ],
    strategy: Strategy::FirstMatch,
};

const CLASS_CONSUMPTION: FieldRule = FieldRule {
    field: Field::ClassConsumptionPct,
    exact: &[">=12"],
    keywords: &[">=12", "≥12", ">= 12", "≥ 12"],
    strategy: Strategy::FirstMatch,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ClassConsumptionRecord {
    pub identity: String,
    pub team: Option<String>,
    pub subgroup: Option<String>,
    /// Share of students at 12+ classes, as a fraction
    pub cc_pct: Option<f64>,
    /// Super class consumption, as a fraction
    pub sc_pct: Option<f64>,
}

pub fn extract(grid: &Grid, trace: &mut Trace) -> Result<SourceTable> {
    let table = promote_header(KIND, grid, HEADER_ROW, 0, trace)?;
    let table = drop_columns(KIND, &table, |h| h.trim() == "#", trace);

    let table = table.forward_fill(TEAM_COL).forward_fill(SUBGROUP_COL);
    if let Some(header) = table.headers().get(TEAM_COL) {
        trace.record(Diagnostic::ColumnResolved {
            source: KIND,
            field: Field::Team,
            header: header.clone(),
        });
    }
    if let Some(header) = table.headers().get(SUBGROUP_COL) {
        trace.record(Diagnostic::ColumnResolved {
            source: KIND,
            field: Field::Subgroup,
            header: header.clone(),
        });
    }

    let Some(identity_col) = resolve_field(KIND, &table, &IDENTITY, trace) else {
        return Ok(SourceTable::empty(KIND));
    };
    let table = purge_garbage(&table, identity_col, trace);

    let sc_col = resolve_field(KIND, &table, &SUPER_CLASS_CONSUMPTION, trace);
    let cc_col = resolve_field(KIND, &table, &CLASS_CONSUMPTION, trace);

    let records = (0..table.len())
        .filter_map(|row| {
            let identity = text_at(&table, row, Some(identity_col))?;
            Some(SourceRecord::ClassConsumption(ClassConsumptionRecord {
                identity,
                team: text_at(&table, row, Some(TEAM_COL)),
                subgroup: text_at(&table, row, Some(SUBGROUP_COL)),
                cc_pct: number_at(&table, row, cc_col),
                sc_pct: number_at(&table, row, sc_col),
            }))
        })
        .collect();

    Ok(SourceTable {
        kind: KIND,
        records,
    })
}

/// Subtotal rows, repeated header rows and grouping artifacts
fn purge_garbage(table: &Table, identity_col: usize, trace: &mut Trace) -> Table {
    let table = purge_total_identity(KIND, table, identity_col, trace);
    let table = purge_header_labels(KIND, &table, identity_col, trace);
    let table = purge(
        KIND,
        &table,
        PurgeReason::TotalInLeadingColumns,
        |row| !row.iter().take(LEADING_COLUMNS).any(|cell| mentions_total(cell)),
        trace,
    );
    let table = purge_blank_identity(KIND, &table, identity_col, trace);
    let table = purge(
        KIND,
        &table,
        PurgeReason::NumericGrouping,
        |row| {
            row.get(TEAM_COL)
                .and_then(|cell| cell.as_text())
                .map(|team| !is_digits(&team))
                .unwrap_or(true)
        },
        trace,
    );
    purge(
        KIND,
        &table,
        PurgeReason::BlankGrouping,
        |row| row.get(TEAM_COL).map(|cell| !cell.is_blank()).unwrap_or(false),
        trace,
    )
}
