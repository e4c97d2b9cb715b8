//! Fixed-rate report.
//!
//! Two layouts are accepted. The per-student export has one row per student
//! with the assigned agent in `LP` and a `Fixed or Not` indicator; rows are
//! grouped by agent. Older per-agent exports already carry a fixed rate and a
//! student count per row.

use std::collections::BTreeMap;

use crate::columns::{find_candidates, find_exact, Field};
use crate::error::Result;
use crate::grid::{Cell, Grid, Table};
use crate::identity;
use crate::trace::{Diagnostic, Trace};
use crate::value::{clean_numeric, round_to};

use super::{
    number_at, promote_header, purge_identity_garbage, text_at, SourceKind, SourceRecord,
    SourceTable,
};

const KIND: SourceKind = SourceKind::FixedRate;
const HEADER_ROW: usize = 0;

const AGENT_LABELS: &[&str] = &["lp"];
const INDICATOR_LABELS: &[&str] = &["fixed or not"];
const GROUP_LABELS: &[&str] = &["lp group"];

const FALLBACK_IDENTITY_LABELS: &[&str] = &["name", "agent"];
const FALLBACK_FIXED_KEYWORDS: &[&str] = &["fixed", "rate"];
const FALLBACK_STUDENT_KEYWORDS: &[&str] = &["student", "count"];

const TRUTHY: &[&str] = &["yes", "y", "true", "fixed"];

#[derive(Debug, Clone, PartialEq)]
pub struct FixedRateRecord {
    pub identity: String,
    pub group: Option<String>,
    pub students: Option<f64>,
    /// Fixed students over all students, in percent
    pub fixed_pct: Option<f64>,
}

pub fn extract(grid: &Grid, trace: &mut Trace) -> Result<SourceTable> {
    let table = promote_header(KIND, grid, HEADER_ROW, 0, trace)?;
    let headers = table.headers();

    let records = match (
        find_exact(headers, AGENT_LABELS),
        find_exact(headers, INDICATOR_LABELS),
    ) {
        (Some(agent_col), Some(indicator_col)) => {
            layout(trace, "per_student");
            record_column(&table, Field::Identity, Some(agent_col), trace);
            record_column(&table, Field::FixedIndicator, Some(indicator_col), trace);
            let group_col = find_exact(headers, GROUP_LABELS);
            record_column(&table, Field::Group, group_col, trace);
            let table = purge_identity_garbage(KIND, &table, agent_col, trace);
            per_student(&table, agent_col, indicator_col, group_col)
        }
        _ => {
            let identity_col = find_exact(headers, FALLBACK_IDENTITY_LABELS);
            record_column(&table, Field::Identity, identity_col, trace);
            let Some(identity_col) = identity_col else {
                return Ok(SourceTable::empty(KIND));
            };
            layout(trace, "per_agent");
            let fixed_col = find_candidates(headers, FALLBACK_FIXED_KEYWORDS).first().copied();
            record_column(&table, Field::FixedPct, fixed_col, trace);
            let students_col = find_candidates(headers, FALLBACK_STUDENT_KEYWORDS)
                .first()
                .copied();
            record_column(&table, Field::Students, students_col, trace);
            let table = purge_identity_garbage(KIND, &table, identity_col, trace);
            per_agent(&table, identity_col, fixed_col, students_col)
        }
    };

    Ok(SourceTable {
        kind: KIND,
        records: records.into_iter().map(SourceRecord::FixedRate).collect(),
    })
}

fn layout(trace: &mut Trace, layout: &str) {
    trace.record(Diagnostic::LayoutSelected {
        source: KIND,
        layout: layout.to_string(),
    });
}

fn record_column(table: &Table, field: Field, col: Option<usize>, trace: &mut Trace) {
    match col {
        Some(idx) => trace.record(Diagnostic::ColumnResolved {
            source: KIND,
            field,
            header: table.headers()[idx].clone(),
        }),
        None => trace.record(Diagnostic::FieldNotResolved {
            source: KIND,
            field,
        }),
    }
}

/// Whether a non-blank indicator cell means "fixed"
fn is_fixed(cell: &Cell) -> bool {
    match cell {
        Cell::Bool(b) => *b,
        Cell::Text(text) if TRUTHY.contains(&text.trim().to_lowercase().as_str()) => true,
        other => clean_numeric(other).map(|v| v != 0.0).unwrap_or(false),
    }
}

#[derive(Default)]
struct Tally {
    fixed: usize,
    total: usize,
    group: Option<String>,
}

fn per_student(
    table: &Table,
    agent_col: usize,
    indicator_col: usize,
    group_col: Option<usize>,
) -> Vec<FixedRateRecord> {
    let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
    for row in 0..table.len() {
        let Some(agent) = identity::normalize_opt(text_at(table, row, Some(agent_col)).as_deref())
        else {
            continue;
        };
        let tally = tallies.entry(agent).or_default();
        let indicator = table.cell(row, indicator_col);
        if !indicator.is_blank() {
            tally.total += 1;
            if is_fixed(indicator) {
                tally.fixed += 1;
            }
        }
        if tally.group.is_none() {
            tally.group = text_at(table, row, group_col);
        }
    }

    tallies
        .into_iter()
        .map(|(identity, tally)| FixedRateRecord {
            identity,
            group: tally.group,
            students: Some(tally.total as f64),
            fixed_pct: (tally.total > 0)
                .then(|| round_to(tally.fixed as f64 / tally.total as f64 * 100.0, 2)),
        })
        .collect()
}

fn per_agent(
    table: &Table,
    identity_col: usize,
    fixed_col: Option<usize>,
    students_col: Option<usize>,
) -> Vec<FixedRateRecord> {
    (0..table.len())
        .filter_map(|row| {
            Some(FixedRateRecord {
                identity: text_at(table, row, Some(identity_col))?,
                group: None,
                students: number_at(table, row, students_col),
                fixed_pct: number_at(table, row, fixed_col),
            })
        })
        .collect()
}
