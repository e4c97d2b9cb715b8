//! All-leads report: one row per lead with its assigned agent and the time of
//! the agent's last note on it.
//!
//! Leads are grouped by agent. A lead counts as recovered when its last note
//! falls within the trailing recovery window ending at the processing instant.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::columns::{Field, FieldRule, Strategy};
use crate::config::ReconcileOptions;
use crate::error::Result;
use crate::grid::{Cell, Grid, Table};
use crate::identity;
use crate::trace::{Diagnostic, Trace};

use super::{
    promote_header, purge_identity_garbage, resolve_field, text_at, SourceKind, SourceRecord,
    SourceTable,
};

const KIND: SourceKind = SourceKind::AllLeads;
const HEADER_ROW: usize = 0;
const NOT_AVAILABLE: &str = "N/A";

const AGENT: FieldRule = FieldRule {
    field: Field::Identity,
    exact: &[
        "the last (current) name of the lp employee assigned",
        "lp employee assigned",
        "lp employee",
        "employee assigned",
        "assigned lp",
        "lp name",
        "agent name",
        "agent",
    ],
    keywords: &["lp&employee", "lp&assigned", "agent&name"],
    strategy: Strategy::HeaderOrder,
};

const NOTE_TIME: FieldRule = FieldRule {
    field: Field::NoteTime,
    exact: &[
        "lp last note time",
        "lp last note",
        "last note time",
        "note time",
        "lp note time",
    ],
    keywords: &["lp&note&time"],
    strategy: Strategy::HeaderOrder,
};

const STUDENT_ID: FieldRule = FieldRule {
    field: Field::StudentId,
    exact: &[
        "student id",
        "studentid",
        "student_id",
        "id",
        "lead id",
        "leadid",
        "lead_id",
        "student",
    ],
    keywords: &["student&id", "lead&id"],
    strategy: Strategy::HeaderOrder,
};

/// A lead without a recent note
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnrecoveredLead {
    pub student_id: String,
    pub note_time: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllLeadsRecord {
    pub identity: String,
    pub total_leads: usize,
    pub recovered_leads: usize,
    pub unrecovered_leads: usize,
    /// Empty when the report has no student id column
    pub unrecovered_students: Vec<UnrecoveredLead>,
}

impl AllLeadsRecord {
    fn new(identity: String) -> Self {
        Self {
            identity,
            total_leads: 0,
            recovered_leads: 0,
            unrecovered_leads: 0,
            unrecovered_students: Vec::new(),
        }
    }
}

pub fn extract(grid: &Grid, options: &ReconcileOptions, trace: &mut Trace) -> Result<SourceTable> {
    let table = promote_header(KIND, grid, HEADER_ROW, 0, trace)?;

    let Some(agent_col) = resolve_field(KIND, &table, &AGENT, trace) else {
        return Ok(SourceTable::empty(KIND));
    };
    let note_col = resolve_field(KIND, &table, &NOTE_TIME, trace);
    let id_col = resolve_field(KIND, &table, &STUDENT_ID, trace);

    let table = purge_identity_garbage(KIND, &table, agent_col, trace);

    let cutoff = recovery_cutoff(options);
    if cutoff.is_none() {
        trace.record(Diagnostic::RecoveryWindowOutOfRange {
            source: KIND,
            days: options.recovery_window_days,
        });
    }
    let mut unparseable = 0;
    let mut agents: BTreeMap<String, AllLeadsRecord> = BTreeMap::new();

    for row in 0..table.len() {
        let Some(agent) = identity::normalize_opt(text_at(&table, row, Some(agent_col)).as_deref())
        else {
            continue;
        };
        let record = agents
            .entry(agent.clone())
            .or_insert_with(|| AllLeadsRecord::new(agent));
        record.total_leads += 1;

        let note_date = match note_col {
            Some(col) => {
                let cell = table.cell(row, col);
                let parsed = parse_note_date(cell);
                if parsed.is_none() && !cell.is_blank() {
                    unparseable += 1;
                }
                parsed
            }
            None => None,
        };

        if is_recovered(note_date, cutoff) {
            record.recovered_leads += 1;
        } else {
            record.unrecovered_leads += 1;
            if id_col.is_some() {
                record
                    .unrecovered_students
                    .push(unrecovered_detail(&table, row, id_col, note_col));
            }
        }
    }

    if unparseable > 0 {
        trace.record(Diagnostic::UnparseableTimestamps {
            source: KIND,
            count: unparseable,
        });
    }

    Ok(SourceTable {
        kind: KIND,
        records: agents.into_values().map(SourceRecord::AllLeads).collect(),
    })
}

/// Start of the recovery window; `None` when the window does not fit the calendar
fn recovery_cutoff(options: &ReconcileOptions) -> Option<NaiveDateTime> {
    Duration::try_days(options.recovery_window_days)
        .and_then(|window| options.now.checked_sub_signed(window))
}

/// Date part of a note time: a date cell, or `YYYY-MM-DD` text optionally
/// followed by a time after a space
fn parse_note_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Text(text) => {
            let date_part = text.split_whitespace().next()?;
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
        }
        _ => None,
    }
}

fn is_recovered(note_date: Option<NaiveDate>, cutoff: Option<NaiveDateTime>) -> bool {
    match (note_date.and_then(|date| date.and_hms_opt(0, 0, 0)), cutoff) {
        (Some(midnight), Some(cutoff)) => midnight >= cutoff,
        _ => false,
    }
}

fn unrecovered_detail(
    table: &Table,
    row: usize,
    id_col: Option<usize>,
    note_col: Option<usize>,
) -> UnrecoveredLead {
    UnrecoveredLead {
        student_id: text_at(table, row, id_col).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        note_time: text_at(table, row, note_col).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
    }
}
