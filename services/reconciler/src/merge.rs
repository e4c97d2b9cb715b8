//! Reconciliation of per-source tables into one record per agent.
//!
//! Stages, each a pure function over the previous stage's output:
//! 1. `identity_basis` - union of identities over every source
//! 2. `join` - outer join of each source onto the basis, keeping team/group
//!    values source-qualified
//! 3. `coalesce` - first non-null qualified value wins, in merge order
//! 4. `scale_percentages` - fractional class-consumption/upgrade values to percent
//! 5. `flag_coverage` - per-family presence flags
//! 6. `derive_conversion` - recovered / total leads

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::columns::Field;
use crate::sources::{SourceKind, SourceRecord, SourceTable, UnrecoveredLead};
use crate::trace::{Diagnostic, Trace};

/// Agent record after all sources are merged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedAgentRecord {
    pub identity: String,
    pub team: Option<String>,
    pub group: Option<String>,
    pub students: Option<f64>,
    pub fixed_pct: Option<f64>,
    pub cc_pct: Option<f64>,
    pub sc_pct: Option<f64>,
    pub up_pct: Option<f64>,
    pub referral_leads: Option<f64>,
    pub referral_showups: Option<f64>,
    pub referral_paid: Option<f64>,
    pub referral_ach_pct: Option<f64>,
    pub total_leads: Option<usize>,
    pub recovered_leads: Option<usize>,
    pub unrecovered_leads: Option<usize>,
    pub unrecovered_students: Vec<UnrecoveredLead>,
    pub conversion_rate: Option<f64>,
    pub has_cc_data: bool,
    pub has_up_data: bool,
    pub has_re_data: bool,
}

/// A grouping value tagged with the source that supplied it
#[derive(Debug, Clone, PartialEq)]
pub struct Qualified {
    pub source: SourceKind,
    pub value: Option<String>,
}

/// Basis row after the outer join, before coalescing
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    pub record: MergedAgentRecord,
    pub teams: Vec<Qualified>,
    pub groups: Vec<Qualified>,
}

impl JoinedRecord {
    fn new(identity: &str) -> Self {
        Self {
            record: MergedAgentRecord {
                identity: identity.to_string(),
                ..MergedAgentRecord::default()
            },
            teams: Vec::new(),
            groups: Vec::new(),
        }
    }

    fn absorb(&mut self, source: SourceKind, record: &SourceRecord) {
        let merged = &mut self.record;
        match record {
            SourceRecord::ClassConsumption(r) => {
                self.teams.push(Qualified {
                    source,
                    value: r.team.clone(),
                });
                self.groups.push(Qualified {
                    source,
                    value: r.subgroup.clone(),
                });
                merged.cc_pct = r.cc_pct;
                merged.sc_pct = r.sc_pct;
            }
            SourceRecord::UpgradeRate(r) => {
                self.groups.push(Qualified {
                    source,
                    value: r.subgroup.clone(),
                });
                merged.up_pct = r.up_pct;
            }
            SourceRecord::Referral(r) => {
                self.groups.push(Qualified {
                    source,
                    value: r.subgroup.clone(),
                });
                merged.referral_leads = r.leads;
                merged.referral_showups = r.showups;
                merged.referral_paid = r.paid;
                merged.referral_ach_pct = r.achievement_pct;
            }
            SourceRecord::FixedRate(r) => {
                self.groups.push(Qualified {
                    source,
                    value: r.group.clone(),
                });
                merged.students = r.students;
                merged.fixed_pct = r.fixed_pct;
            }
            SourceRecord::AllLeads(r) => {
                merged.total_leads = Some(r.total_leads);
                merged.recovered_leads = Some(r.recovered_leads);
                merged.unrecovered_leads = Some(r.unrecovered_leads);
                merged.unrecovered_students = r.unrecovered_students.clone();
            }
        }
    }
}

/// Sorted union of every identity seen in any source
pub fn identity_basis(sources: &[SourceTable]) -> BTreeSet<String> {
    sources
        .iter()
        .flat_map(|table| table.records.iter())
        .map(|record| record.identity().to_string())
        .collect()
}

/// Outer-join each source onto the basis, in the order given
pub fn join(basis: &BTreeSet<String>, sources: &[SourceTable], trace: &mut Trace) -> Vec<JoinedRecord> {
    let mut joined: BTreeMap<&str, JoinedRecord> = basis
        .iter()
        .map(|identity| (identity.as_str(), JoinedRecord::new(identity)))
        .collect();

    for table in sources {
        for record in &table.records {
            if let Some(row) = joined.get_mut(record.identity()) {
                row.absorb(table.kind, record);
            }
        }
        trace.record(Diagnostic::SourceMerged {
            source: table.kind,
            records: table.len(),
        });
    }

    joined.into_values().collect()
}

fn first_present(candidates: &[Qualified]) -> Option<&Qualified> {
    candidates.iter().find(|q| q.value.is_some())
}

/// Collapse each qualified family into one field; earliest non-null wins.
/// Records one `field_supplied` diagnostic per (field, winning source).
pub fn coalesce(joined: Vec<JoinedRecord>, trace: &mut Trace) -> Vec<MergedAgentRecord> {
    let mut tally: BTreeMap<(Field, SourceKind), usize> = BTreeMap::new();
    let mut take = |field: Field, candidates: &[Qualified]| {
        first_present(candidates).and_then(|winner| {
            *tally.entry((field, winner.source)).or_default() += 1;
            winner.value.clone()
        })
    };

    let merged = joined
        .into_iter()
        .map(|row| MergedAgentRecord {
            team: take(Field::Team, &row.teams),
            group: take(Field::Group, &row.groups),
            ..row.record
        })
        .collect();

    for ((field, source), agents) in tally {
        trace.record(Diagnostic::FieldSupplied {
            field,
            source,
            agents,
        });
    }
    merged
}

/// Class consumption, super class consumption and upgrade arrive as fractions
pub fn scale_percentages(records: Vec<MergedAgentRecord>) -> Vec<MergedAgentRecord> {
    let percent = |value: Option<f64>| value.map(|v| v * 100.0);
    records
        .into_iter()
        .map(|r| MergedAgentRecord {
            cc_pct: percent(r.cc_pct),
            sc_pct: percent(r.sc_pct),
            up_pct: percent(r.up_pct),
            ..r
        })
        .collect()
}

pub fn flag_coverage(records: Vec<MergedAgentRecord>) -> Vec<MergedAgentRecord> {
    records
        .into_iter()
        .map(|r| MergedAgentRecord {
            has_cc_data: r.cc_pct.is_some() || r.sc_pct.is_some(),
            has_up_data: r.up_pct.is_some(),
            has_re_data: r.referral_leads.is_some()
                || r.referral_showups.is_some()
                || r.referral_paid.is_some(),
            ..r
        })
        .collect()
}

/// Conversion rate is recovered over total leads, null without leads
pub fn derive_conversion(records: Vec<MergedAgentRecord>) -> Vec<MergedAgentRecord> {
    records
        .into_iter()
        .map(|r| {
            let conversion_rate = match (r.recovered_leads, r.total_leads) {
                (Some(recovered), Some(total)) if total > 0 => {
                    Some(recovered as f64 / total as f64 * 100.0)
                }
                _ => None,
            };
            MergedAgentRecord {
                conversion_rate,
                ..r
            }
        })
        .collect()
}

/// Full merge. Sources are applied in [`SourceKind`] order regardless of the
/// order they are passed in.
pub fn merge(mut sources: Vec<SourceTable>, trace: &mut Trace) -> Vec<MergedAgentRecord> {
    sources.sort_by_key(|table| table.kind);

    let basis = identity_basis(&sources);
    trace.record(Diagnostic::IdentityBasis {
        identities: basis.len(),
    });

    let joined = join(&basis, &sources, trace);
    let merged = coalesce(joined, trace);
    let merged = scale_percentages(merged);
    let merged = flag_coverage(merged);
    derive_conversion(merged)
}

/// How many agents carry each family of data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub agents: usize,
    pub with_team: usize,
    pub with_group: usize,
    pub with_class_consumption: usize,
    pub with_upgrade: usize,
    pub with_referral: usize,
}

impl Coverage {
    pub fn from_records(records: &[MergedAgentRecord]) -> Self {
        let count = |pred: fn(&MergedAgentRecord) -> bool| records.iter().filter(|r| pred(r)).count();
        Self {
            agents: records.len(),
            with_team: count(|r| r.team.is_some()),
            with_group: count(|r| r.group.is_some()),
            with_class_consumption: count(|r| r.has_cc_data),
            with_upgrade: count(|r| r.has_up_data),
            with_referral: count(|r| r.has_re_data),
        }
    }
}
