//! Structured pipeline diagnostics.
//!
//! Every decision the pipeline takes (header promotion, column resolution,
//! purged rows, scaling, malformed sources) is recorded as a [`Diagnostic`] in
//! the per-invocation [`Trace`] and returned with the result. Recording also
//! emits a `tracing` event so a host process sees the same decisions in its log.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::columns::Field;
use crate::sources::{PurgeReason, SourceKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Diagnostic {
    HeaderPromoted {
        source: SourceKind,
        row: usize,
        columns: usize,
    },
    ColumnsDropped {
        source: SourceKind,
        count: usize,
    },
    LayoutSelected {
        source: SourceKind,
        layout: String,
    },
    ColumnResolved {
        source: SourceKind,
        field: Field,
        header: String,
    },
    FieldNotResolved {
        source: SourceKind,
        field: Field,
    },
    RowsPurged {
        source: SourceKind,
        reason: PurgeReason,
        count: usize,
    },
    AchievementScaled {
        source: SourceKind,
        sample_max: f64,
    },
    UnparseableTimestamps {
        source: SourceKind,
        count: usize,
    },
    RecoveryWindowOutOfRange {
        source: SourceKind,
        days: i64,
    },
    DuplicateIdentity {
        source: SourceKind,
        identity: String,
    },
    SourceExtracted {
        source: SourceKind,
        records: usize,
    },
    MalformedSource {
        source: SourceKind,
        reason: String,
    },
    IdentityBasis {
        identities: usize,
    },
    SourceMerged {
        source: SourceKind,
        records: usize,
    },
    /// How many agents took a coalesced field from `source`
    FieldSupplied {
        field: Field,
        source: SourceKind,
        agents: usize,
    },
}

impl Diagnostic {
    /// Conditions a caller most likely wants to look at
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Diagnostic::FieldNotResolved { .. }
                | Diagnostic::MalformedSource { .. }
                | Diagnostic::UnparseableTimestamps { .. }
                | Diagnostic::RecoveryWindowOutOfRange { .. }
                | Diagnostic::DuplicateIdentity { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::HeaderPromoted { source, row, columns } => {
                write!(f, "[{source}] header promoted from row {row} ({columns} columns)")
            }
            Diagnostic::ColumnsDropped { source, count } => {
                write!(f, "[{source}] dropped {count} decorative columns")
            }
            Diagnostic::LayoutSelected { source, layout } => {
                write!(f, "[{source}] using {layout} layout")
            }
            Diagnostic::ColumnResolved { source, field, header } => {
                write!(f, "[{source}] {field} -> '{header}'")
            }
            Diagnostic::FieldNotResolved { source, field } => {
                write!(f, "[{source}] no column found for {field}")
            }
            Diagnostic::RowsPurged { source, reason, count } => {
                write!(f, "[{source}] purged {count} rows ({reason})")
            }
            Diagnostic::AchievementScaled { source, sample_max } => {
                write!(f, "[{source}] achievement sample max {sample_max} <= ceiling, scaled x100")
            }
            Diagnostic::UnparseableTimestamps { source, count } => {
                write!(f, "[{source}] {count} note times could not be parsed")
            }
            Diagnostic::RecoveryWindowOutOfRange { source, days } => {
                write!(f, "[{source}] recovery window of {days} days is out of range, no lead counts as recovered")
            }
            Diagnostic::DuplicateIdentity { source, identity } => {
                write!(f, "[{source}] duplicate identity {identity}, keeping first")
            }
            Diagnostic::SourceExtracted { source, records } => {
                write!(f, "[{source}] extracted {records} records")
            }
            Diagnostic::MalformedSource { source, reason } => {
                write!(f, "[{source}] malformed source excluded: {reason}")
            }
            Diagnostic::IdentityBasis { identities } => {
                write!(f, "identity basis has {identities} agents")
            }
            Diagnostic::SourceMerged { source, records } => {
                write!(f, "[{source}] merged {records} records")
            }
            Diagnostic::FieldSupplied { field, source, agents } => {
                write!(f, "[{source}] supplied {field} for {agents} agents")
            }
        }
    }
}

/// Ordered diagnostics of one pipeline invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    entries: Vec<Diagnostic>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_warning() {
            warn!("{}", diagnostic);
        } else {
            debug!("{}", diagnostic);
        }
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_keep_order() {
        let mut trace = Trace::new();
        trace.record(Diagnostic::IdentityBasis { identities: 2 });
        trace.record(Diagnostic::FieldNotResolved {
            source: SourceKind::Referral,
            field: Field::ReferralPaid,
        });
        assert_eq!(trace.entries().len(), 2);
        assert!(!trace.entries()[0].is_warning());
        assert!(trace.entries()[1].is_warning());
    }

    #[test]
    fn test_serializes_tagged() {
        let diagnostic = Diagnostic::RowsPurged {
            source: SourceKind::ClassConsumption,
            reason: PurgeReason::TotalIdentity,
            count: 3,
        };
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["event"], "rows_purged");
        assert_eq!(json["source"], "class_consumption");
        assert_eq!(json["reason"], "total_identity");
        assert_eq!(json["count"], 3);
    }

    #[test]
    fn test_display() {
        let diagnostic = Diagnostic::ColumnResolved {
            source: SourceKind::UpgradeRate,
            field: Field::UpgradePct,
            header: "M-2 Cumulative Upgrade Rate".to_string(),
        };
        assert_eq!(
            diagnostic.to_string(),
            "[upgrade_rate] upgrade_pct -> 'M-2 Cumulative Upgrade Rate'"
        );
    }
}
