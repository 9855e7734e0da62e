use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::analysis::table::StatementTable;
use crate::error::AppError;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Point-in-time facts for one company as delivered by the data source.
/// Values are raw; route them through `sanitize` before arithmetic.
#[derive(Debug, Clone, Default)]
pub struct FinancialSnapshot {
    pub price: Option<f64>,
    pub company_name: Option<String>,
    pub market_cap: Option<f64>,
    pub total_debt: Option<f64>,
    pub total_equity: Option<f64>,
    /// Percentage-scaled (e.g. 45.0 means 0.45).
    pub debt_to_equity: Option<f64>,
    /// Trailing twelve months.
    pub net_income: Option<f64>,
    /// Fraction (e.g. 0.43 means 43%).
    pub gross_margin: Option<f64>,
    pub free_cash_flow_estimate: Option<f64>,
}

/// Annual income statement and balance sheet columns, most recent first.
/// `None` means the table was not delivered at all.
#[derive(Debug, Clone, Default)]
pub struct Statements {
    pub income: Option<StatementTable>,
    pub balance: Option<StatementTable>,
}

/// Everything fetched for one company in one run.
#[derive(Debug, Clone, Default)]
pub struct CompanyFinancials {
    pub snapshot: FinancialSnapshot,
    pub statements: Statements,
    /// Most recent period first. `None` when the source had no cash-flow table.
    pub cash_flow: Option<StatementTable>,
}

/// One year of statement values. A `None` field means the line item is absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementYear {
    pub revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub net_income: Option<f64>,
    pub long_term_debt: Option<f64>,
    pub short_term_debt: Option<f64>,
    pub total_equity: Option<f64>,
}

// ---------------------------------------------------------------------------
// Classifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Survivor,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValuationBucket {
    /// FCF yield > 8%
    Bargain,
    /// FCF yield in (4.5%, 8%]
    Fair,
    Pricey,
}

impl ValuationBucket {
    pub fn from_fcf_yield(fcf_yield: f64) -> Self {
        use crate::config::valuation_thresholds::*;
        if fcf_yield > BARGAIN_MIN {
            ValuationBucket::Bargain
        } else if fcf_yield > FAIR_MIN {
            ValuationBucket::Fair
        } else {
            ValuationBucket::Pricey
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashQuality {
    Verified,
    /// Accounting profit that did not turn into cash.
    Suspicious,
}

macro_rules! impl_label {
    ($ty:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($ty::$variant),)+
                    other => Err(AppError::Decode(format!(
                        concat!("unknown ", stringify!($ty), " {:?}"),
                        other
                    ))),
                }
            }
        }
    };
}

impl_label!(Status { Survivor => "SURVIVOR", Rejected => "REJECTED" });
impl_label!(ValuationBucket { Bargain => "BARGAIN", Fair => "FAIR", Pricey => "PRICEY" });
impl_label!(CashQuality { Verified => "VERIFIED", Suspicious => "SUSPICIOUS" });

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Separator used when reasons are flattened into one persisted string.
pub const REASON_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub ticker: String,
    pub company_name: String,
    pub price: f64,
    pub status: Status,
    /// Failure reasons in rule order. Empty iff `status == Survivor`.
    pub reasons: Vec<String>,
    pub valuation: ValuationBucket,
    pub cash_quality: CashQuality,
    pub cash_engine_score: i64,
    pub safety_score: i64,
    /// Multi-year average ROIC, percent.
    pub roic: f64,
    pub debt_to_equity: f64,
    /// Multi-year average gross margin, percent.
    pub gross_margin: f64,
    pub fcf_yield: f64,
}

impl Verdict {
    pub fn joined_reasons(&self) -> String {
        self.reasons.join(REASON_SEPARATOR)
    }

    pub fn split_reasons(joined: &str) -> Vec<String> {
        joined
            .split(REASON_SEPARATOR)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A stored verdict and the epoch-millisecond time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub verdict: Verdict,
    pub updated_at_ms: i64,
}

/// Wall-clock epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
