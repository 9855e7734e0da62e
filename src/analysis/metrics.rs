use tracing::debug;

use crate::analysis::sanitize::sanitize;
use crate::analysis::table::{LineItem, StatementTable, TableError};
use crate::config::ROIC_MAX;
use crate::types::FinancialSnapshot;

// ---------------------------------------------------------------------------
// Current-period metrics
// ---------------------------------------------------------------------------

impl FinancialSnapshot {
    /// Reported gross margin as a percentage.
    pub fn current_gross_margin(&self) -> f64 {
        sanitize(self.gross_margin) * 100.0
    }

    /// Net income / (equity + total debt), percent, capped at `ROIC_MAX`.
    /// Zero when the denominator is not positive.
    pub fn current_roic(&self) -> f64 {
        let capital = sanitize(self.total_equity) + sanitize(self.total_debt);
        if capital > 0.0 {
            (sanitize(self.net_income) / capital * 100.0).min(ROIC_MAX)
        } else {
            0.0
        }
    }

    /// The source reports debt-to-equity percentage-scaled; this is the plain ratio.
    // NOTE: applied unconditionally. A provider that already reports a ratio
    // would be scaled down a hundredfold here.
    pub fn debt_to_equity_ratio(&self) -> f64 {
        sanitize(self.debt_to_equity) / 100.0
    }
}

// ---------------------------------------------------------------------------
// Free cash flow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcfSource {
    /// "Free Cash Flow" line.
    Reported,
    /// Operating cash flow plus (negative) capital expenditure.
    OperatingLessCapex,
    /// Snapshot estimate; 0.0 when the snapshot has none.
    SnapshotEstimate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashFlowFacts {
    pub free_cash_flow: f64,
    pub source: FcfSource,
    /// Percent of market capitalization.
    pub fcf_yield: f64,
}

type FcfStep = fn(&StatementTable) -> Result<Option<f64>, TableError>;

/// Cash-flow table lookups, first match wins. Everything else falls back to the snapshot.
const FCF_CHAIN: &[(FcfSource, FcfStep)] = &[
    (FcfSource::Reported, reported_fcf),
    (FcfSource::OperatingLessCapex, operating_less_capex),
];

fn reported_fcf(table: &StatementTable) -> Result<Option<f64>, TableError> {
    if !table.has(LineItem::FreeCashFlow) {
        return Ok(None);
    }
    table.cell(LineItem::FreeCashFlow, 0)
}

fn operating_less_capex(table: &StatementTable) -> Result<Option<f64>, TableError> {
    if !table.has(LineItem::OperatingCashFlow) || !table.has(LineItem::CapitalExpenditure) {
        return Ok(None);
    }
    let operating = table.cell(LineItem::OperatingCashFlow, 0)?;
    // Capital expenditure is reported negative.
    let capex = table.cell(LineItem::CapitalExpenditure, 0)?;
    Ok(operating.zip(capex).map(|(ocf, capex)| ocf + capex))
}

/// Most recent free cash flow. Lookup failures never propagate; they fall
/// through to the next step of the chain.
pub fn resolve_free_cash_flow(
    cash_flow: Option<&StatementTable>,
    snapshot: &FinancialSnapshot,
) -> (f64, FcfSource) {
    if let Some(table) = cash_flow.filter(|t| !t.is_empty()) {
        for (source, step) in FCF_CHAIN {
            match step(table) {
                Ok(Some(fcf)) => return (fcf, *source),
                Ok(None) => {}
                Err(e) => {
                    debug!(?source, "cash flow lookup failed: {e}");
                    break;
                }
            }
        }
    }
    (sanitize(snapshot.free_cash_flow_estimate), FcfSource::SnapshotEstimate)
}

/// FCF / market cap, percent. Zero when market cap is not positive.
pub fn fcf_yield(free_cash_flow: f64, market_cap: f64) -> f64 {
    if market_cap > 0.0 {
        free_cash_flow / market_cap * 100.0
    } else {
        0.0
    }
}

pub fn cash_flow_facts(cash_flow: Option<&StatementTable>, snapshot: &FinancialSnapshot) -> CashFlowFacts {
    let (free_cash_flow, source) = resolve_free_cash_flow(cash_flow, snapshot);
    CashFlowFacts {
        free_cash_flow,
        source,
        fcf_yield: fcf_yield(free_cash_flow, sanitize(snapshot.market_cap)),
    }
}
