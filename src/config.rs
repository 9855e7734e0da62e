use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const YAHOO_API_URL: &str = "https://query2.finance.yahoo.com";
/// Visited once per session to pick up the cookie the crumb endpoint requires.
pub const YAHOO_CONSENT_URL: &str = "https://fc.yahoo.com";
pub const UNIVERSE_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/main/data/constituents.csv";

/// Substituted when the universe provider fails or returns nothing.
pub const FALLBACK_TICKERS: &[&str] = &["AAPL", "MSFT", "GOOG", "AMZN", "NVDA", "TSLA"];

/// Revenue / invested capital below this is too small for a meaningful ratio.
pub const MATERIALITY_FLOOR: f64 = 1_000_000.0;

/// Number of annual statement columns considered for history.
pub const HISTORY_YEARS: usize = 3;

/// Historical ROIC samples are clamped into this range.
pub const ROIC_MIN: f64 = -100.0;
pub const ROIC_MAX: f64 = 200.0;

/// Minimum sample is "unstable" below this fraction of the threshold.
pub const STABILITY_FACTOR: f64 = 0.8;

/// Free cash flow below this fraction of positive net income is suspicious.
pub const CASH_CONVERSION_RATIO: f64 = 0.7;

/// Fetch attempts per request. Backoff is linear: `RETRY_DELAY_MS * attempt`.
pub const FETCH_ATTEMPTS: u32 = 2;
pub const RETRY_DELAY_MS: u64 = 1_000;

/// Upper bounds for the duration settings, so every derived `Duration` and
/// timer deadline stays representable.
pub const MAX_CACHE_DURATION_DAYS: u64 = 36_500;
pub const MAX_RESCAN_INTERVAL_HOURS: u64 = 87_600;

/// Per-request HTTP timeout (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// FCF yield cutoffs (%) for the valuation bucket.
pub mod valuation_thresholds {
    pub const BARGAIN_MIN: f64 = 8.0;
    pub const FAIR_MIN: f64 = 4.5;
}

/// Screening thresholds. Immutable once built; handed to the verdict engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum average gross margin, percent.
    pub min_gross_margin: f64,
    /// Minimum average ROIC, percent.
    pub min_roic: f64,
    pub max_debt_to_equity: f64,
    /// Minimum FCF yield, percent.
    pub min_fcf_yield: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_gross_margin: 45.0,
            min_roic: 25.0,
            max_debt_to_equity: 0.5,
            min_fcf_yield: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Keep running after the first scan and serve the HTTP API (SERVE_API)
    pub serve_api: bool,
    /// Keep verdicts in memory only; the database file is never touched (DRY_RUN)
    pub dry_run: bool,
    /// Hours between rescans while serving; 0 = scan once (RESCAN_INTERVAL_HOURS)
    pub rescan_interval_hours: u64,
    /// Concurrent per-ticker workers (SCAN_WORKERS)
    pub scan_workers: usize,
    /// Reuse stored verdicts younger than this; 0 disables caching (CACHE_DURATION_DAYS)
    pub cache_duration_days: u64,
    pub thresholds: Thresholds,
    pub yahoo_api_url: String,
    pub yahoo_consent_url: String,
    pub universe_url: String,
    /// Explicit universe (TICKERS, comma-separated). Bypasses UNIVERSE_URL when non-empty.
    pub tickers: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Thresholds::default();
        Ok(Self {
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            db_path: lookup("DB_PATH").unwrap_or_else(|| "screener.db".to_string()),
            api_port: parse_or(&lookup, "API_PORT", 3000)?,
            serve_api: flag(&lookup, "SERVE_API"),
            dry_run: flag(&lookup, "DRY_RUN"),
            rescan_interval_hours: at_most(
                "RESCAN_INTERVAL_HOURS",
                parse_or(&lookup, "RESCAN_INTERVAL_HOURS", 0)?,
                MAX_RESCAN_INTERVAL_HOURS,
            )?,
            scan_workers: parse_or::<usize, _>(&lookup, "SCAN_WORKERS", 4)?.max(1),
            cache_duration_days: at_most(
                "CACHE_DURATION_DAYS",
                parse_or(&lookup, "CACHE_DURATION_DAYS", 7)?,
                MAX_CACHE_DURATION_DAYS,
            )?,
            thresholds: Thresholds {
                min_gross_margin: parse_or(&lookup, "MIN_GROSS_MARGIN", defaults.min_gross_margin)?,
                min_roic: parse_or(&lookup, "MIN_ROIC", defaults.min_roic)?,
                max_debt_to_equity: parse_or(
                    &lookup,
                    "MAX_DEBT_TO_EQUITY",
                    defaults.max_debt_to_equity,
                )?,
                min_fcf_yield: parse_or(&lookup, "MIN_FCF_YIELD", defaults.min_fcf_yield)?,
            },
            yahoo_api_url: lookup("YAHOO_API_URL").unwrap_or_else(|| YAHOO_API_URL.to_string()),
            yahoo_consent_url: lookup("YAHOO_CONSENT_URL")
                .unwrap_or_else(|| YAHOO_CONSENT_URL.to_string()),
            universe_url: lookup("UNIVERSE_URL").unwrap_or_else(|| UNIVERSE_URL.to_string()),
            tickers: lookup("TICKERS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn cache_window(&self) -> Duration {
        Duration::from_secs(self.cache_duration_days.saturating_mul(24 * 3_600))
    }

    /// `None` when periodic rescans are off.
    pub fn rescan_interval(&self) -> Option<Duration> {
        (self.rescan_interval_hours > 0)
            .then(|| Duration::from_secs(self.rescan_interval_hours.saturating_mul(3_600)))
    }
}

fn flag<F>(lookup: &F, key: &str) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn at_most(key: &str, value: u64, max: u64) -> Result<u64> {
    if value > max {
        return Err(AppError::Config(format!("{key} must be at most {max}, got {value}")));
    }
    Ok(value)
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.thresholds, Thresholds::default());
        assert_eq!(cfg.cache_duration_days, 7);
        assert_eq!(cfg.scan_workers, 4);
        assert_eq!(cfg.api_port, 3000);
        assert!(!cfg.serve_api);
        assert!(!cfg.dry_run);
        assert!(cfg.tickers.is_empty());
        assert_eq!(cfg.cache_window(), Duration::from_secs(7 * 86_400));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config_from(&[
            ("MIN_GROSS_MARGIN", "50"),
            ("MAX_DEBT_TO_EQUITY", "1.25"),
            ("CACHE_DURATION_DAYS", "0"),
            ("SCAN_WORKERS", "0"),
            ("SERVE_API", "true"),
            ("DRY_RUN", "1"),
            ("TICKERS", " aapl, msft ,,brk-b "),
        ])
        .unwrap();
        assert_eq!(cfg.thresholds.min_gross_margin, 50.0);
        assert_eq!(cfg.thresholds.max_debt_to_equity, 1.25);
        assert_eq!(cfg.cache_window(), Duration::ZERO);
        assert_eq!(cfg.scan_workers, 1);
        assert!(cfg.serve_api);
        assert!(cfg.dry_run);
        assert_eq!(cfg.tickers, vec!["AAPL", "MSFT", "BRK-B"]);
    }

    #[test]
    fn malformed_threshold_is_a_config_error() {
        let err = config_from(&[("MIN_ROIC", "lots")]).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("MIN_ROIC")));
    }

    #[test]
    fn oversized_durations_are_config_errors() {
        let err = config_from(&[("CACHE_DURATION_DAYS", "300000000000000")]).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("CACHE_DURATION_DAYS")));

        let err = config_from(&[("RESCAN_INTERVAL_HOURS", "18446744073709551615")]).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("RESCAN_INTERVAL_HOURS")));
    }

    #[test]
    fn largest_accepted_durations_convert() {
        let cfg = config_from(&[
            ("CACHE_DURATION_DAYS", &MAX_CACHE_DURATION_DAYS.to_string()),
            ("RESCAN_INTERVAL_HOURS", &MAX_RESCAN_INTERVAL_HOURS.to_string()),
        ])
        .unwrap();
        assert_eq!(cfg.cache_window(), Duration::from_secs(MAX_CACHE_DURATION_DAYS * 86_400));
        assert_eq!(cfg.rescan_interval(), Some(Duration::from_secs(MAX_RESCAN_INTERVAL_HOURS * 3_600)));
        assert_eq!(config_from(&[]).unwrap().rescan_interval(), None);
    }
}
