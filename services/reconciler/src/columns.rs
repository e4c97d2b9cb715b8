//! Column resolution: finding semantic fields inside loosely named headers.
//!
//! Each field an extractor needs is described by a [`FieldRule`]: exact header
//! labels, an ordered keyword list and a disambiguation [`Strategy`]. Resolution
//! is a pure function of the table and the rule.

use std::fmt;

use serde::Serialize;

use crate::grid::{Cell, Table};

/// Header tokens marking a percentage/ratio column
const PERCENT_TOKENS: &[&str] = &["%", "rate", "ratio", "conversion", "转化", "率", "比例"];

const INTEGER_TOLERANCE: f64 = 1e-9;

/// Semantic fields the extractors look for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Identity,
    Team,
    Subgroup,
    Group,
    ClassConsumptionPct,
    SuperClassConsumptionPct,
    UpgradePct,
    ReferralLeads,
    ReferralShowups,
    ReferralPaid,
    AchievementPct,
    FixedIndicator,
    FixedPct,
    Students,
    NoteTime,
    StudentId,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Identity => "identity",
            Field::Team => "team",
            Field::Subgroup => "subgroup",
            Field::Group => "group",
            Field::ClassConsumptionPct => "class_consumption_pct",
            Field::SuperClassConsumptionPct => "super_class_consumption_pct",
            Field::UpgradePct => "upgrade_pct",
            Field::ReferralLeads => "referral_leads",
            Field::ReferralShowups => "referral_showups",
            Field::ReferralPaid => "referral_paid",
            Field::AchievementPct => "achievement_pct",
            Field::FixedIndicator => "fixed_indicator",
            Field::FixedPct => "fixed_pct",
            Field::Students => "students",
            Field::NoteTime => "note_time",
            Field::StudentId => "student_id",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to choose among several matching headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Exact label first, then the first keyword (in priority order) that any header contains
    FirstMatch,
    /// A candidate whose header contains `%`, else first match in keyword order
    PercentPreferred,
    /// Highest count-likeness score over the column values
    CountScore,
    /// Leftmost header equal to any exact label, else leftmost header matching
    /// any keyword; label and keyword priority are ignored
    HeaderOrder,
}

/// Declarative description of one semantic field
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: Field,
    /// Whole-header labels, compared after case folding, in priority order
    pub exact: &'static [&'static str],
    /// Substring keywords, case folded, in priority order. A keyword written
    /// `a&b` matches only headers containing every `&`-separated part.
    pub keywords: &'static [&'static str],
    pub strategy: Strategy,
}

/// Lowercase, trim and collapse inner whitespace runs to one space
pub fn fold_header(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn keyword_matches(folded: &str, keyword: &str) -> bool {
    !folded.is_empty() && keyword.split('&').all(|part| folded.contains(part))
}

/// Indexes of headers containing any keyword, in header order
pub fn find_candidates(headers: &[String], keywords: &[&str]) -> Vec<usize> {
    headers
        .iter()
        .enumerate()
        .filter(|(_, header)| {
            let folded = fold_header(header);
            keywords.iter().any(|k| keyword_matches(&folded, k))
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// Index of the first header equal (after folding) to one of `labels`,
/// trying labels in priority order
pub fn find_exact(headers: &[String], labels: &[&str]) -> Option<usize> {
    let folded: Vec<String> = headers.iter().map(|h| fold_header(h)).collect();
    labels
        .iter()
        .find_map(|label| folded.iter().position(|h| h == label))
}

/// Index of the leftmost header equal (after folding) to any of `labels`
pub fn find_exact_leftmost(headers: &[String], labels: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| labels.contains(&fold_header(h).as_str()))
}

/// Index of the first header containing a keyword, trying keywords in priority order
fn first_by_keyword(headers: &[String], candidates: &[usize], keywords: &[&str]) -> Option<usize> {
    keywords.iter().find_map(|keyword| {
        candidates
            .iter()
            .copied()
            .find(|&idx| keyword_matches(&fold_header(&headers[idx]), keyword))
    })
}

pub fn is_percent_header(header: &str) -> bool {
    let folded = fold_header(header);
    PERCENT_TOKENS.iter().any(|token| folded.contains(token))
}

/// Count-likeness of a column.
///
/// `fraction(> 1) + 0.5 * fraction(integer-like) - fraction(in [0, 1])`.
/// Count columns skew large and integral, ratio columns cluster in [0, 1].
/// A column with no numeric values scores -1.
pub fn count_score<'a, I>(cells: I) -> f64
where
    I: IntoIterator<Item = &'a Cell>,
{
    let values: Vec<f64> = cells.into_iter().filter_map(Cell::as_number).collect();
    if values.is_empty() {
        return -1.0;
    }
    let above_one = fraction(&values, |v| v > 1.0);
    let integer_like = fraction(&values, |v| (v - v.round()).abs() < INTEGER_TOLERANCE);
    let unit_interval = fraction(&values, |v| (0.0..=1.0).contains(&v));
    above_one + 0.5 * integer_like - unit_interval
}

fn fraction(values: &[f64], pred: impl Fn(f64) -> bool) -> f64 {
    values.iter().filter(|&&v| pred(v)).count() as f64 / values.len() as f64
}

/// Pick the most count-like candidate, ignoring percentage-named headers
/// unless nothing else matched. Ties keep the earlier column.
fn pick_count_column(table: &Table, candidates: &[usize]) -> Option<usize> {
    let named: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&idx| !is_percent_header(&table.headers()[idx]))
        .collect();
    let pool = if named.is_empty() { candidates } else { &named[..] };

    let mut best: Option<(usize, f64)> = None;
    for &idx in pool {
        let score = count_score(table.column(idx));
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Resolve `rule` against `table`; `None` when no header matches
pub fn resolve(table: &Table, rule: &FieldRule) -> Option<usize> {
    let headers = table.headers();
    match rule.strategy {
        Strategy::FirstMatch => find_exact(headers, rule.exact).or_else(|| {
            let candidates = find_candidates(headers, rule.keywords);
            first_by_keyword(headers, &candidates, rule.keywords)
        }),
        Strategy::PercentPreferred => {
            let candidates = find_candidates(headers, rule.keywords);
            candidates
                .iter()
                .copied()
                .find(|&idx| headers[idx].contains('%'))
                .or_else(|| first_by_keyword(headers, &candidates, rule.keywords))
        }
        Strategy::CountScore => {
            let candidates = find_candidates(headers, rule.keywords);
            pick_count_column(table, &candidates)
        }
        Strategy::HeaderOrder => find_exact_leftmost(headers, rule.exact)
            .or_else(|| find_candidates(headers, rule.keywords).first().copied()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn table(names: &[&str], rows: Vec<Vec<Cell>>) -> Table {
        Table::new(headers(names), rows)
    }

    const LEADS: FieldRule = FieldRule {
        field: Field::ReferralLeads,
        exact: &[],
        keywords: &["leads"],
        strategy: Strategy::CountScore,
    };

    const ACH: FieldRule = FieldRule {
        field: Field::AchievementPct,
        exact: &[],
        keywords: &["leads ach%", "ach%", "achievement"],
        strategy: Strategy::PercentPreferred,
    };

    // -------------------------------------------------------------------------
    // CANDIDATE SEARCH
    // -------------------------------------------------------------------------

    #[test]
    fn test_candidates_preserve_header_order() {
        let h = headers(&["Paid", "Total Leads", "Name", "LEADS target"]);
        assert_eq!(find_candidates(&h, &["leads"]), vec![1, 3]);
    }

    #[test]
    fn test_conjunctive_keywords() {
        let h = headers(&["LP note", "LP last note time", "Lead ID"]);
        assert_eq!(find_candidates(&h, &["lp&note&time"]), vec![1]);
        assert_eq!(find_candidates(&h, &["student&id", "lead&id"]), vec![2]);
    }

    #[test]
    fn test_fold_header_collapses_whitespace() {
        assert_eq!(fold_header("  CM   Name\n"), "cm name");
        assert_eq!(fold_header("M-2累积升舱率"), "m-2累积升舱率");
    }

    #[test]
    fn test_exact_respects_label_priority() {
        let h = headers(&["Agent", "LP name"]);
        assert_eq!(find_exact(&h, &["lp name", "agent"]), Some(1));
        assert_eq!(find_exact(&h, &["nothing"]), None);
    }

    // -------------------------------------------------------------------------
    // FIRST MATCH
    // -------------------------------------------------------------------------

    #[test]
    fn test_first_match_prefers_exact_label() {
        let rule = FieldRule {
            field: Field::Identity,
            exact: &["name"],
            keywords: &["name"],
            strategy: Strategy::FirstMatch,
        };
        let t = table(&["Team Name", "Name"], vec![]);
        assert_eq!(resolve(&t, &rule), Some(1));
    }

    #[test]
    fn test_first_match_follows_keyword_priority() {
        let rule = FieldRule {
            field: Field::UpgradePct,
            exact: &[],
            keywords: &["cumulative upgrade rate", "upgrade"],
            strategy: Strategy::FirstMatch,
        };
        let t = table(&["Upgrade target", "M-2 Cumulative Upgrade Rate"], vec![]);
        assert_eq!(resolve(&t, &rule), Some(1));
    }

    #[test]
    fn test_header_order_ignores_label_priority() {
        let rule = FieldRule {
            field: Field::Identity,
            exact: &["lp name", "agent"],
            keywords: &["lp&employee", "agent&name"],
            strategy: Strategy::HeaderOrder,
        };
        let t = table(&["Agent", "LP name"], vec![]);
        assert_eq!(resolve(&t, &rule), Some(0));

        let t = table(&["Agent Name (old)", "LP employee"], vec![]);
        assert_eq!(resolve(&t, &rule), Some(0));
    }

    // -------------------------------------------------------------------------
    // COUNT SCORE
    // -------------------------------------------------------------------------

    #[test]
    fn test_count_score_prefers_integers_above_one() {
        let counts = [Cell::Number(12.0), Cell::Number(30.0), Cell::Number(4.0)];
        let ratios = [Cell::Number(0.4), Cell::Number(0.75), Cell::Number(0.1)];
        assert!(count_score(counts.iter()) > count_score(ratios.iter()));
        assert!((count_score(counts.iter()) - 1.5).abs() < 1e-12);
        assert!((count_score(ratios.iter()) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_count_score_no_numbers() {
        let cells = [Cell::from("n/a"), Cell::Empty];
        assert_eq!(count_score(cells.iter()), -1.0);
    }

    #[test]
    fn test_count_column_excludes_percent_headers() {
        // the ratio column has larger values but is percent-named
        let t = table(
            &["Leads", "Leads Conversion Rate"],
            vec![
                vec![Cell::Number(0.0), Cell::Number(50.0)],
                vec![Cell::Number(1.0), Cell::Number(75.0)],
            ],
        );
        assert_eq!(resolve(&t, &LEADS), Some(0));
    }

    #[test]
    fn test_count_column_falls_back_to_percent_headers() {
        let t = table(&["Leads %"], vec![vec![Cell::Number(0.3)]]);
        assert_eq!(resolve(&t, &LEADS), Some(0));
    }

    #[test]
    fn test_count_column_picks_highest_score() {
        let t = table(
            &["Leads target", "Leads actual"],
            vec![
                vec![Cell::Number(0.5), Cell::Number(14.0)],
                vec![Cell::Number(0.9), Cell::Number(9.0)],
            ],
        );
        assert_eq!(resolve(&t, &LEADS), Some(1));
    }

    #[test]
    fn test_count_column_none_without_candidates() {
        let t = table(&["Name"], vec![]);
        assert_eq!(resolve(&t, &LEADS), None);
    }

    // -------------------------------------------------------------------------
    // PERCENT PREFERRED
    // -------------------------------------------------------------------------

    #[test]
    fn test_percent_preferred_takes_percent_header() {
        let t = table(&["Achievement", "Leads Ach%"], vec![]);
        assert_eq!(resolve(&t, &ACH), Some(1));
    }

    #[test]
    fn test_percent_preferred_falls_back_to_keyword_order() {
        let rule = FieldRule {
            field: Field::AchievementPct,
            exact: &[],
            keywords: &["lead achievement", "achievement"],
            strategy: Strategy::PercentPreferred,
        };
        let t = table(&["Achievement", "Lead Achievement"], vec![]);
        assert_eq!(resolve(&t, &rule), Some(1));
    }

    #[test]
    fn test_percent_header_detection() {
        assert!(is_percent_header("Leads Ach%"));
        assert!(is_percent_header("Show up Rate"));
        assert!(is_percent_header("转化率"));
        assert!(!is_percent_header("Show up"));
    }
}
