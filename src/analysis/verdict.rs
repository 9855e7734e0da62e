use std::fmt;

use tracing::debug;

use crate::analysis::cash_quality;
use crate::analysis::history::{aggregate, AggregateMetrics};
use crate::analysis::metrics::{cash_flow_facts, FcfSource};
use crate::analysis::sanitize::sanitize;
use crate::config::{Thresholds, STABILITY_FACTOR};
use crate::types::{CashQuality, CompanyFinancials, Status, ValuationBucket, Verdict};

/// Everything the rules look at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerdictInputs {
    pub aggregates: AggregateMetrics,
    pub debt_to_equity: f64,
    pub fcf_yield: f64,
    pub cash_quality: CashQuality,
    /// Which step of the free-cash-flow chain produced `fcf_yield`.
    pub fcf_source: FcfSource,
}

impl VerdictInputs {
    pub fn from_financials(financials: &CompanyFinancials) -> Self {
        let snapshot = &financials.snapshot;
        let aggregates = aggregate(
            &financials.statements,
            snapshot.current_gross_margin(),
            snapshot.current_roic(),
        );
        let cash_flow = cash_flow_facts(financials.cash_flow.as_ref(), snapshot);
        Self {
            aggregates,
            debt_to_equity: snapshot.debt_to_equity_ratio(),
            fcf_yield: cash_flow.fcf_yield,
            cash_quality: cash_quality::classify(sanitize(snapshot.net_income), cash_flow.free_cash_flow),
            fcf_source: cash_flow.source,
        }
    }
}

/// A failed rule, carrying the numbers that made it fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reason {
    WeakMoat { avg_gross_margin: f64, min_gross_margin: f64 },
    UnstableMoat { min_gross_margin: f64 },
    WeakEngine { avg_roic: f64 },
    UnstableEngine { min_roic: f64 },
    HighDebt { debt_to_equity: f64 },
    Expensive { fcf_yield: f64 },
    PoorCashQuality,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::WeakMoat { avg_gross_margin, min_gross_margin } => {
                write!(f, "WEAK MOAT (AVG GM {avg_gross_margin:.0}%, MIN {min_gross_margin:.0}%)")
            }
            Reason::UnstableMoat { min_gross_margin } => {
                write!(f, "UNSTABLE MOAT (MIN GM {min_gross_margin:.0}%)")
            }
            Reason::WeakEngine { avg_roic } => write!(f, "WEAK ENGINE (AVG ROIC {avg_roic:.1}%)"),
            Reason::UnstableEngine { min_roic } => write!(f, "UNSTABLE ENGINE (MIN ROIC {min_roic:.1}%)"),
            Reason::HighDebt { debt_to_equity } => write!(f, "HIGH DEBT (D/E {debt_to_equity:.2})"),
            Reason::Expensive { fcf_yield } => write!(f, "EXPENSIVE (YIELD {fcf_yield:.1}%)"),
            Reason::PoorCashQuality => f.write_str("POOR CASH QUALITY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub status: Status,
    /// In rule order.
    pub reasons: Vec<Reason>,
    pub valuation: ValuationBucket,
    pub cash_engine_score: i64,
    pub safety_score: i64,
}

/// Applies a fixed threshold set. Holds no other state.
#[derive(Debug, Clone, Copy)]
pub struct VerdictEngine {
    thresholds: Thresholds,
}

impl VerdictEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Runs every rule; a failing rule never stops the ones after it.
    pub fn evaluate(&self, inputs: &VerdictInputs) -> Evaluation {
        let t = &self.thresholds;
        let agg = &inputs.aggregates;
        let mut reasons = Vec::new();

        // Stability is only checked once the average clears the bar.
        if agg.avg_gross_margin < t.min_gross_margin {
            reasons.push(Reason::WeakMoat {
                avg_gross_margin: agg.avg_gross_margin,
                min_gross_margin: agg.min_gross_margin,
            });
        } else if agg.min_gross_margin < t.min_gross_margin * STABILITY_FACTOR {
            reasons.push(Reason::UnstableMoat { min_gross_margin: agg.min_gross_margin });
        }

        if agg.avg_roic < t.min_roic {
            reasons.push(Reason::WeakEngine { avg_roic: agg.avg_roic });
        } else if agg.min_roic < t.min_roic * STABILITY_FACTOR {
            reasons.push(Reason::UnstableEngine { min_roic: agg.min_roic });
        }

        if inputs.debt_to_equity > t.max_debt_to_equity {
            reasons.push(Reason::HighDebt { debt_to_equity: inputs.debt_to_equity });
        }

        if inputs.fcf_yield < t.min_fcf_yield {
            reasons.push(Reason::Expensive { fcf_yield: inputs.fcf_yield });
        }

        if inputs.cash_quality == CashQuality::Suspicious {
            reasons.push(Reason::PoorCashQuality);
        }

        let status = if reasons.is_empty() { Status::Survivor } else { Status::Rejected };

        Evaluation {
            status,
            reasons,
            valuation: ValuationBucket::from_fcf_yield(inputs.fcf_yield),
            cash_engine_score: cash_engine_score(agg.avg_roic, agg.avg_gross_margin),
            safety_score: safety_score(inputs.debt_to_equity),
        }
    }

    /// Full pipeline for one company: aggregates, cash flow, cash quality, rules.
    pub fn assess(&self, ticker: &str, financials: &CompanyFinancials) -> Verdict {
        let snapshot = &financials.snapshot;
        let inputs = VerdictInputs::from_financials(financials);
        let aggregates = inputs.aggregates;
        debug!(
            ticker,
            fcf_source = ?inputs.fcf_source,
            gross_margin_samples = aggregates.gross_margin_samples,
            roic_samples = aggregates.roic_samples,
            "verdict inputs resolved"
        );
        let evaluation = self.evaluate(&inputs);

        Verdict {
            ticker: ticker.to_string(),
            company_name: snapshot.company_name.clone().unwrap_or_else(|| ticker.to_string()),
            price: sanitize(snapshot.price),
            status: evaluation.status,
            reasons: evaluation.reasons.iter().map(Reason::to_string).collect(),
            valuation: evaluation.valuation,
            cash_quality: inputs.cash_quality,
            cash_engine_score: evaluation.cash_engine_score,
            safety_score: evaluation.safety_score,
            roic: aggregates.avg_roic,
            debt_to_equity: inputs.debt_to_equity,
            gross_margin: aggregates.avg_gross_margin,
            fcf_yield: inputs.fcf_yield,
        }
    }
}

/// ROIC contributes up to 60 points (full at 40%), gross margin up to 40 (full at 80%).
pub fn cash_engine_score(roic: f64, gross_margin: f64) -> i64 {
    let roic_part = (roic / 40.0 * 60.0).min(60.0);
    let margin_part = (gross_margin / 80.0 * 40.0).min(40.0);
    ((roic_part + margin_part) as i64).clamp(0, 100)
}

/// 100 at zero leverage, 0 at D/E 0.5 and above.
pub fn safety_score(debt_to_equity: f64) -> i64 {
    ((100.0 - debt_to_equity * 200.0).max(0.0) as i64).clamp(0, 100)
}
