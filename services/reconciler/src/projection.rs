//! Output projection onto the stable external schema.
//!
//! Every agent object carries every field, whatever subset of sources was
//! supplied: text defaults to "", counts to 0, percentages to null and the
//! unrecovered list to [].

use std::collections::BTreeMap;

use serde::Serialize;

use crate::merge::MergedAgentRecord;
use crate::sources::UnrecoveredLead;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub name: String,
    pub team: String,
    pub group: String,
    pub students: i64,
    pub fixed_pct: Option<f64>,
    pub cc_pct: Option<f64>,
    pub sc_pct: Option<f64>,
    pub up_pct: Option<f64>,
    pub referral_leads: i64,
    pub referral_showups: i64,
    pub referral_paid: i64,
    pub referral_ach_pct: Option<f64>,
    pub conversion_rate: Option<f64>,
    pub total_leads: i64,
    pub recovered_leads: i64,
    pub unrecovered_leads: i64,
    pub unrecovered_students: Vec<UnrecoveredLead>,
}

/// NaN and infinities become null
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Counts are truncated toward zero (2.6 -> 2)
fn count(value: Option<f64>) -> i64 {
    finite(value).map(|v| v.trunc() as i64).unwrap_or(0)
}

fn tally(value: Option<usize>) -> i64 {
    value
        .and_then(|v| i64::try_from(v).ok())
        .unwrap_or(0)
}

impl From<&MergedAgentRecord> for AgentRecord {
    fn from(r: &MergedAgentRecord) -> Self {
        Self {
            name: r.identity.clone(),
            team: r.team.clone().unwrap_or_default(),
            group: r.group.clone().unwrap_or_default(),
            students: count(r.students),
            fixed_pct: finite(r.fixed_pct),
            cc_pct: finite(r.cc_pct),
            sc_pct: finite(r.sc_pct),
            up_pct: finite(r.up_pct),
            referral_leads: count(r.referral_leads),
            referral_showups: count(r.referral_showups),
            referral_paid: count(r.referral_paid),
            referral_ach_pct: finite(r.referral_ach_pct),
            conversion_rate: finite(r.conversion_rate),
            total_leads: tally(r.total_leads),
            recovered_leads: tally(r.recovered_leads),
            unrecovered_leads: tally(r.unrecovered_leads),
            unrecovered_students: r.unrecovered_students.clone(),
        }
    }
}

/// Map merged records to external agent objects keyed by identity
pub fn project(records: &[MergedAgentRecord]) -> BTreeMap<String, AgentRecord> {
    records
        .iter()
        .map(|r| (r.identity.clone(), AgentRecord::from(r)))
        .collect()
}
