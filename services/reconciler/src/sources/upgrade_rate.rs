//! Upgrade-rate report.
//!
//! Header on the first row followed by two description rows. Workplace
//! columns are noise; the agent is the "Last CM Name" column.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::columns::{fold_header, Field, FieldRule, Strategy};
use crate::error::Result;
use crate::grid::{Cell, Grid, Table};
use crate::trace::Trace;

use super::{
    drop_columns, number_at, promote_header, purge, purge_identity_garbage, resolve_field,
    text_at, PurgeReason, SourceKind, SourceRecord, SourceTable,
};

const KIND: SourceKind = SourceKind::UpgradeRate;
const HEADER_ROW: usize = 0;
const DESCRIPTION_ROWS: usize = 2;

/// Identities standing in for "no agent"
const PLACEHOLDERS: &[&str] = &["-", "sub total"];

static SUMMARY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(total|sum|average|mean|header|column)").unwrap());

const IDENTITY: FieldRule = FieldRule {
    field: Field::Identity,
    exact: &[],
    keywords: &["last cm name"],
    strategy: Strategy::FirstMatch,
};

const SUBGROUP: FieldRule = FieldRule {
    field: Field::Subgroup,
    exact: &[],
    keywords: &["last cm team"],
    strategy: Strategy::FirstMatch,
};

const UPGRADE: FieldRule = FieldRule {
    field: Field::UpgradePct,
    exact: &[],
    keywords: &[
        "m-2累积升舱率",
        "m-2 cumulative upgrade rate",
        "累积升舱率",
        "cumulative upgrade rate",
    ],
    strategy: Strategy::FirstMatch,
};

#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeRateRecord {
    pub identity: String,
    pub subgroup: Option<String>,
    /// Cumulative upgrade rate, as a fraction
    pub up_pct: Option<f64>,
}

pub fn extract(grid: &Grid, trace: &mut Trace) -> Result<SourceTable> {
    let table = promote_header(KIND, grid, HEADER_ROW, DESCRIPTION_ROWS, trace)?;
    let table = drop_columns(
        KIND,
        &table,
        |h| fold_header(h).contains("workplace"),
        trace,
    );

    let Some(identity_col) = resolve_field(KIND, &table, &IDENTITY, trace) else {
        return Ok(SourceTable::empty(KIND));
    };
    let subgroup_col = resolve_field(KIND, &table, &SUBGROUP, trace);
    let upgrade_col = resolve_field(KIND, &table, &UPGRADE, trace);

    let table = purge_garbage(&table, identity_col, trace);

    let records = (0..table.len())
        .filter_map(|row| {
            let identity = text_at(&table, row, Some(identity_col))?;
            Some(SourceRecord::UpgradeRate(UpgradeRateRecord {
                identity,
                subgroup: text_at(&table, row, subgroup_col),
                up_pct: number_at(&table, row, upgrade_col),
            }))
        })
        .collect();

    Ok(SourceTable {
        kind: KIND,
        records,
    })
}

fn folded_identity(row: &[Cell], identity_col: usize) -> Option<String> {
    row[identity_col].as_text().map(|name| name.to_lowercase())
}

fn purge_garbage(table: &Table, identity_col: usize, trace: &mut Trace) -> Table {
    let table = purge(
        KIND,
        table,
        PurgeReason::Placeholder,
        |row| {
            folded_identity(row, identity_col)
                .map(|name| !PLACEHOLDERS.contains(&name.as_str()))
                .unwrap_or(true)
        },
        trace,
    );
    let table = purge_identity_garbage(KIND, &table, identity_col, trace);
    purge(
        KIND,
        &table,
        PurgeReason::SummaryPrefix,
        |row| {
            folded_identity(row, identity_col)
                .map(|name| !SUMMARY_PREFIX.is_match(&name))
                .unwrap_or(true)
        },
        trace,
    )
}
