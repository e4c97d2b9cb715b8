//! Referral (CM team) report.
//!
//! The leftmost column is an index and is dropped; the header is then on raw
//! row 1. The first remaining column carries the subgroup with merged cells.
//! Metric columns are loosely named and often duplicated as count and ratio
//! variants, so counts are chosen by value shape and achievement prefers a
//! `%` header.

use crate::columns::{Field, FieldRule, Strategy};
use crate::config::ReconcileOptions;
use crate::error::Result;
use crate::grid::Grid;
use crate::trace::{Diagnostic, Trace};

use super::{
    number_at, promote_header, purge_identity_garbage, resolve_field, text_at, PurgeReason,
    SourceKind, SourceRecord, SourceTable,
};

const KIND: SourceKind = SourceKind::Referral;
const HEADER_ROW: usize = 1;
const SUBGROUP_COL: usize = 0;

const IDENTITY: FieldRule = FieldRule {
    field: Field::Identity,
    exact: &["cm name"],
    keywords: &["cm name", "cmname"],
    strategy: Strategy::FirstMatch,
};

const LEADS: FieldRule = FieldRule {
    field: Field::ReferralLeads,
    exact: &[],
    keywords: &["leads"],
    strategy: Strategy::CountScore,
};

const SHOWUPS: FieldRule = FieldRule {
    field: Field::ReferralShowups,
    exact: &[],
    keywords: &["show up", "showup", "show-up", "show_up"],
    strategy: Strategy::CountScore,
};

const PAID: FieldRule = FieldRule {
    field: Field::ReferralPaid,
    exact: &[],
    keywords: &["paid"],
    strategy: Strategy::CountScore,
};

const ACHIEVEMENT: FieldRule = FieldRule {
    field: Field::AchievementPct,
    exact: &[],
    keywords: &[
        "leads ach%",
        "ach%",
        "achievement%",
        "achievement",
        "leads_ach%",
        "leads achievement%",
        "lead ach%",
        "lead achievement%",
        "referral ach%",
        "referral achievement%",
        "acheivement%",
        "ach %",
        "leads ach %",
        "lead ach %",
    ],
    strategy: Strategy::PercentPreferred,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ReferralRecord {
    pub identity: String,
    pub subgroup: Option<String>,
    pub leads: Option<f64>,
    pub showups: Option<f64>,
    pub paid: Option<f64>,
    /// Leads achievement, in percent
    pub achievement_pct: Option<f64>,
}

pub fn extract(grid: &Grid, options: &ReconcileOptions, trace: &mut Trace) -> Result<SourceTable> {
    let grid = grid.without_first_column();
    let table = promote_header(KIND, &grid, HEADER_ROW, 0, trace)?;
    let table = table.forward_fill(SUBGROUP_COL);

    let Some(identity_col) = resolve_field(KIND, &table, &IDENTITY, trace) else {
        return Ok(SourceTable::empty(KIND));
    };
    let table = purge_identity_garbage(KIND, &table, identity_col, trace);

    let leads_col = resolve_field(KIND, &table, &LEADS, trace);
    let showups_col = resolve_field(KIND, &table, &SHOWUPS, trace);
    let paid_col = resolve_field(KIND, &table, &PAID, trace);
    let achievement_col = resolve_field(KIND, &table, &ACHIEVEMENT, trace);

    let mut records: Vec<ReferralRecord> = (0..table.len())
        .filter_map(|row| {
            Some(ReferralRecord {
                identity: text_at(&table, row, Some(identity_col))?,
                subgroup: text_at(&table, row, Some(SUBGROUP_COL)),
                leads: number_at(&table, row, leads_col),
                showups: number_at(&table, row, showups_col),
                paid: number_at(&table, row, paid_col),
                achievement_pct: number_at(&table, row, achievement_col),
            })
        })
        .collect();

    scale_achievement(&mut records, options, trace);

    let before = records.len();
    let prefix = options.referral_subgroup_prefix.as_str();
    records.retain(|r| {
        r.subgroup
            .as_deref()
            .map(|subgroup| subgroup.starts_with(prefix))
            .unwrap_or(false)
    });
    let outside = before - records.len();
    if outside > 0 {
        trace.record(Diagnostic::RowsPurged {
            source: KIND,
            reason: PurgeReason::OutsideRegion,
            count: outside,
        });
    }

    Ok(SourceTable {
        kind: KIND,
        records: records.into_iter().map(SourceRecord::Referral).collect(),
    })
}

/// Decide whether achievement is stored as a fraction.
///
/// The first `achievement_sample_size` non-null values are inspected; when
/// their max does not exceed the ceiling every value is multiplied by 100.
/// Small genuine percentages (an agent at 1.5%) are indistinguishable from
/// fractions here.
fn scale_achievement(records: &mut [ReferralRecord], options: &ReconcileOptions, trace: &mut Trace) {
    let sample_max = records
        .iter()
        .filter_map(|r| r.achievement_pct)
        .take(options.achievement_sample_size)
        .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))));

    let Some(sample_max) = sample_max else {
        return;
    };
    if sample_max > options.achievement_fraction_ceiling {
        return;
    }
    for record in records.iter_mut() {
        if let Some(value) = record.achievement_pct.as_mut() {
            *value *= 100.0;
        }
    }
    trace.record(Diagnostic::AchievementScaled {
        source: KIND,
        sample_max,
    });
}
