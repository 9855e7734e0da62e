/// Row type for the `stocks` table (see migrations/).
use crate::error::AppError;
use crate::types::{CacheRecord, Verdict};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StockRow {
    pub ticker: String,
    pub company_name: String,
    pub price: f64,
    pub safety_score: i64,
    pub cash_engine_score: i64,
    pub roic_current: f64,
    pub debt_to_equity: f64,
    pub gross_margin_3yr_avg: f64,
    pub fcf_yield: f64,
    pub status: String,
    pub failure_reasons: String,
    pub valuation_status: String,
    pub lie_detector_status: String,
    pub updated_at: i64,
}

impl StockRow {
    pub fn from_verdict(v: &Verdict, updated_at: i64) -> Self {
        Self {
            ticker: v.ticker.clone(),
            company_name: v.company_name.clone(),
            price: v.price,
            safety_score: v.safety_score,
            cash_engine_score: v.cash_engine_score,
            roic_current: v.roic,
            debt_to_equity: v.debt_to_equity,
            gross_margin_3yr_avg: v.gross_margin,
            fcf_yield: v.fcf_yield,
            status: v.status.to_string(),
            failure_reasons: v.joined_reasons(),
            valuation_status: v.valuation.to_string(),
            lie_detector_status: v.cash_quality.to_string(),
            updated_at,
        }
    }
}

impl TryFrom<StockRow> for CacheRecord {
    type Error = AppError;

    fn try_from(row: StockRow) -> Result<Self, Self::Error> {
        Ok(CacheRecord {
            verdict: Verdict {
                status: row.status.parse()?,
                valuation: row.valuation_status.parse()?,
                cash_quality: row.lie_detector_status.parse()?,
                reasons: Verdict::split_reasons(&row.failure_reasons),
                ticker: row.ticker,
                company_name: row.company_name,
                price: row.price,
                cash_engine_score: row.cash_engine_score,
                safety_score: row.safety_score,
                roic: row.roic_current,
                debt_to_equity: row.debt_to_equity,
                gross_margin: row.gross_margin_3yr_avg,
                fcf_yield: row.fcf_yield,
            },
            updated_at_ms: row.updated_at,
        })
    }
}
