//! Value normalization: heterogeneous cell encodings into numbers

use once_cell::sync::Lazy;
use regex::Regex;

use crate::grid::Cell;

/// Comparison/percent decorations, thousands separators and whitespace
static DECORATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[><≥≤%,\s]").unwrap());

/// First signed decimal numeral
static NUMERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").unwrap());

/// Clean a raw cell into a number.
///
/// Numeric cells pass through. Text has its decorations stripped and the first
/// numeral extracted, so `">=12"` is 12 and `"15.5%"` is 15.5. Anything else
/// (blank, dates, unparseable text) is `None`.
pub fn clean_numeric(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Cell::Text(s) => clean_numeric_str(s),
        _ => None,
    }
}

/// Text form of [`clean_numeric`]
pub fn clean_numeric_str(raw: &str) -> Option<f64> {
    let stripped = DECORATION.replace_all(raw, "");
    let numeral = NUMERAL.find(&stripped)?;
    numeral
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Round to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// True when the text is one or more ASCII digits and nothing else
pub fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_prefixes() {
        assert_eq!(clean_numeric_str(">=12"), Some(12.0));
        assert_eq!(clean_numeric_str("<5"), Some(5.0));
        assert_eq!(clean_numeric_str("≥ 10"), Some(10.0));
        assert_eq!(clean_numeric_str("≤3.5"), Some(3.5));
    }

    #[test]
    fn test_percent_and_separators() {
        assert_eq!(clean_numeric_str("15.5%"), Some(15.5));
        assert_eq!(clean_numeric_str("1,234"), Some(1234.0));
        assert_eq!(clean_numeric_str(" 42 "), Some(42.0));
        assert_eq!(clean_numeric_str("-7.25"), Some(-7.25));
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(clean_numeric_str(""), None);
        assert_eq!(clean_numeric_str("abc"), None);
        assert_eq!(clean_numeric_str("-"), None);
    }

    #[test]
    fn test_first_numeral_wins() {
        assert_eq!(clean_numeric_str("12 of 30"), Some(12.0));
        assert_eq!(clean_numeric_str("approx 0.81 ratio"), Some(0.81));
    }

    #[test]
    fn test_cells() {
        assert_eq!(clean_numeric(&Cell::Number(0.32)), Some(0.32));
        assert_eq!(clean_numeric(&Cell::from(">=12")), Some(12.0));
        assert_eq!(clean_numeric(&Cell::Bool(true)), Some(1.0));
        assert_eq!(clean_numeric(&Cell::Empty), None);
        assert_eq!(clean_numeric(&Cell::Number(f64::NAN)), None);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(66.666_666, 2), 66.67);
        assert_eq!(round_to(50.0, 2), 50.0);
    }

    #[test]
    fn test_is_digits() {
        assert!(is_digits("12"));
        assert!(!is_digits("T1"));
        assert!(!is_digits(""));
        assert!(!is_digits("1.5"));
    }
}
