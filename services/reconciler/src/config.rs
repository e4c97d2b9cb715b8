//! Runtime configuration.
//!
//! `Settings` is read from the environment (after `.env` loading in the
//! binary). `ReconcileOptions` is what the pure core consumes: the same knobs
//! plus the processing instant, injected so runs are reproducible.

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use encoding_rs::Encoding;

pub const DEFAULT_RECOVERY_WINDOW_DAYS: i64 = 14;
/// Upper bound for `RECOVERY_WINDOW_DAYS`, one century
pub const MAX_RECOVERY_WINDOW_DAYS: i64 = 36_500;
pub const DEFAULT_REFERRAL_SUBGROUP_PREFIX: &str = "ME-EG";
pub const DEFAULT_ACHIEVEMENT_SAMPLE_SIZE: usize = 5;
pub const DEFAULT_ACHIEVEMENT_FRACTION_CEILING: f64 = 2.0;
pub const DEFAULT_CSV_FALLBACK_ENCODING: &str = "windows-1252";

/// Knobs of one reconciliation run
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOptions {
    /// Processing instant; the recovery window ends here
    pub now: NaiveDateTime,
    /// A lead is recovered when its last note falls within this many days of `now`
    pub recovery_window_days: i64,
    /// Referral rows are kept only when their subgroup starts with this prefix
    pub referral_subgroup_prefix: String,
    /// Leading non-null achievement values inspected for the fraction heuristic
    pub achievement_sample_size: usize,
    /// Sample max at or below this means achievement is stored as a fraction
    pub achievement_fraction_ceiling: f64,
}

impl ReconcileOptions {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now,
            recovery_window_days: DEFAULT_RECOVERY_WINDOW_DAYS,
            referral_subgroup_prefix: DEFAULT_REFERRAL_SUBGROUP_PREFIX.to_string(),
            achievement_sample_size: DEFAULT_ACHIEVEMENT_SAMPLE_SIZE,
            achievement_fraction_ceiling: DEFAULT_ACHIEVEMENT_FRACTION_CEILING,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub recovery_window_days: i64,
    pub referral_subgroup_prefix: String,
    pub achievement_sample_size: usize,
    pub achievement_fraction_ceiling: f64,
    pub csv_fallback_encoding: &'static Encoding,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let recovery_window_days: i64 =
            parse_or(&lookup, "RECOVERY_WINDOW_DAYS", DEFAULT_RECOVERY_WINDOW_DAYS)?;
        if !(0..=MAX_RECOVERY_WINDOW_DAYS).contains(&recovery_window_days) {
            return Err(anyhow!(
                "RECOVERY_WINDOW_DAYS must be between 0 and {}, got {}",
                MAX_RECOVERY_WINDOW_DAYS,
                recovery_window_days
            ));
        }

        let achievement_sample_size: usize =
            parse_or(&lookup, "ACHIEVEMENT_SAMPLE_SIZE", DEFAULT_ACHIEVEMENT_SAMPLE_SIZE)?;
        if achievement_sample_size == 0 {
            return Err(anyhow!("ACHIEVEMENT_SAMPLE_SIZE must be at least 1"));
        }

        let achievement_fraction_ceiling: f64 = parse_or(
            &lookup,
            "ACHIEVEMENT_FRACTION_CEILING",
            DEFAULT_ACHIEVEMENT_FRACTION_CEILING,
        )?;
        if !achievement_fraction_ceiling.is_finite() {
            return Err(anyhow!("ACHIEVEMENT_FRACTION_CEILING must be a finite number"));
        }

        let label = lookup("CSV_FALLBACK_ENCODING")
            .unwrap_or_else(|| DEFAULT_CSV_FALLBACK_ENCODING.to_string());
        let csv_fallback_encoding = Encoding::for_label(label.trim().as_bytes())
            .with_context(|| format!("CSV_FALLBACK_ENCODING '{}' is not a known encoding", label))?;

        Ok(Self {
            recovery_window_days,
            referral_subgroup_prefix: lookup("REFERRAL_SUBGROUP_PREFIX")
                .unwrap_or_else(|| DEFAULT_REFERRAL_SUBGROUP_PREFIX.to_string()),
            achievement_sample_size,
            achievement_fraction_ceiling,
            csv_fallback_encoding,
        })
    }

    /// Core options for a run at `now`
    pub fn options(&self, now: NaiveDateTime) -> ReconcileOptions {
        ReconcileOptions {
            now,
            recovery_window_days: self.recovery_window_days,
            referral_subgroup_prefix: self.referral_subgroup_prefix.clone(),
            achievement_sample_size: self.achievement_sample_size,
            achievement_fraction_ceiling: self.achievement_fraction_ceiling,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.recovery_window_days, 14);
        assert_eq!(settings.referral_subgroup_prefix, "ME-EG");
        assert_eq!(settings.achievement_sample_size, 5);
        assert_eq!(settings.achievement_fraction_ceiling, 2.0);
        assert_eq!(settings.csv_fallback_encoding, encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("RECOVERY_WINDOW_DAYS", "7"),
            ("REFERRAL_SUBGROUP_PREFIX", "ME-SA"),
            ("CSV_FALLBACK_ENCODING", "utf-16le"),
        ]))
        .unwrap();
        assert_eq!(settings.recovery_window_days, 7);
        assert_eq!(settings.referral_subgroup_prefix, "ME-SA");
        assert_eq!(settings.csv_fallback_encoding, encoding_rs::UTF_16LE);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(Settings::from_lookup(lookup(&[("RECOVERY_WINDOW_DAYS", "two weeks")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("RECOVERY_WINDOW_DAYS", "-1")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("ACHIEVEMENT_SAMPLE_SIZE", "0")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("CSV_FALLBACK_ENCODING", "klingon")])).is_err());
    }

    #[test]
    fn test_recovery_window_upper_bound() {
        assert!(Settings::from_lookup(lookup(&[("RECOVERY_WINDOW_DAYS", "36500")])).is_ok());
        let err = Settings::from_lookup(lookup(&[("RECOVERY_WINDOW_DAYS", "36501")])).unwrap_err();
        assert!(err.to_string().contains("RECOVERY_WINDOW_DAYS"));
        let huge = (i64::MAX / 2).to_string();
        assert!(Settings::from_lookup(lookup(&[("RECOVERY_WINDOW_DAYS", huge.as_str())])).is_err());
    }

    #[test]
    fn test_options_carry_now() {
        let now = NaiveDate::from_ymd_opt(2025, 9, 20)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.options(now), ReconcileOptions::new(now));
    }
}
