use tracing::debug;

use crate::analysis::sanitize::sanitize;
use crate::analysis::table::{LineItem, TableError};
use crate::config::{HISTORY_YEARS, MATERIALITY_FLOOR, ROIC_MAX, ROIC_MIN};
use crate::types::{StatementYear, Statements};

/// Short-term debt line items, first present wins.
pub const SHORT_TERM_DEBT_CHAIN: &[LineItem] = &[LineItem::CurrentDebt, LineItem::ShortLongTermDebt];

/// Multi-year gross margin and ROIC, percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateMetrics {
    pub avg_gross_margin: f64,
    pub min_gross_margin: f64,
    pub avg_roic: f64,
    pub min_roic: f64,
    /// Years that produced a sample. 0 means the current-period fallback is in use.
    pub gross_margin_samples: usize,
    pub roic_samples: usize,
}

impl Statements {
    /// Years available for history. The income table is required; the balance
    /// sheet, when delivered, further limits the count.
    pub fn history_years(&self) -> usize {
        let income = match self.income.as_ref().filter(|t| !t.is_empty()) {
            Some(t) => t.periods(),
            None => return 0,
        };
        let years = income.min(HISTORY_YEARS);
        match self.balance.as_ref().filter(|t| !t.is_empty()) {
            Some(balance) => years.min(balance.periods()),
            None => years,
        }
    }

    pub fn has_balance_sheet(&self) -> bool {
        self.balance.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Reads one year of line items. Absent tables and absent lines yield `None` fields.
    pub fn year(&self, index: usize) -> Result<StatementYear, TableError> {
        let mut year = StatementYear::default();
        if let Some(income) = &self.income {
            year.revenue = income.optional(LineItem::TotalRevenue, index)?;
            year.gross_profit = income.optional(LineItem::GrossProfit, index)?;
            year.net_income = income.optional(LineItem::NetIncome, index)?;
        }
        if let Some(balance) = &self.balance {
            year.long_term_debt = balance.optional(LineItem::LongTermDebt, index)?;
            year.short_term_debt = balance.first_present(SHORT_TERM_DEBT_CHAIN, index)?;
            year.total_equity = balance.optional(LineItem::StockholderEquity, index)?;
        }
        Ok(year)
    }
}

impl StatementYear {
    /// Gross profit / revenue, percent. `None` when revenue is immaterial.
    pub fn gross_margin(&self) -> Option<f64> {
        let revenue = sanitize(self.revenue);
        if revenue > MATERIALITY_FLOOR {
            Some(sanitize(self.gross_profit) / revenue * 100.0)
        } else {
            None
        }
    }

    pub fn invested_capital(&self) -> f64 {
        sanitize(self.total_equity) + sanitize(self.long_term_debt) + sanitize(self.short_term_debt)
    }

    /// Net income / invested capital, percent, clamped. `None` when capital is immaterial.
    pub fn roic(&self) -> Option<f64> {
        let invested = self.invested_capital();
        if invested > MATERIALITY_FLOOR {
            let roic = sanitize(self.net_income) / invested * 100.0;
            Some(roic.clamp(ROIC_MIN, ROIC_MAX))
        } else {
            None
        }
    }
}

/// Average and minimum over up to three statement years. A metric with no
/// included sample falls back to its current-period value for both.
pub fn aggregate(statements: &Statements, current_gross_margin: f64, current_roic: f64) -> AggregateMetrics {
    let mut margins = Vec::with_capacity(HISTORY_YEARS);
    let mut roics = Vec::with_capacity(HISTORY_YEARS);
    let with_balance = statements.has_balance_sheet();

    for index in 0..statements.history_years() {
        let year = match statements.year(index) {
            Ok(y) => y,
            Err(e) => {
                debug!(year = index, "skipping statement year: {e}");
                continue;
            }
        };
        if let Some(gm) = year.gross_margin() {
            margins.push(gm);
        }
        if with_balance {
            if let Some(roic) = year.roic() {
                roics.push(roic);
            }
        }
    }

    let (avg_gross_margin, min_gross_margin) = summarize(&margins, current_gross_margin);
    let (avg_roic, min_roic) = summarize(&roics, current_roic);

    AggregateMetrics {
        avg_gross_margin,
        min_gross_margin,
        avg_roic,
        min_roic,
        gross_margin_samples: margins.len(),
        roic_samples: roics.len(),
    }
}

/// (mean, min) of `samples`, or (fallback, fallback) when empty.
fn summarize(samples: &[f64], fallback: f64) -> (f64, f64) {
    if samples.is_empty() {
        return (fallback, fallback);
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    (mean, min)
}

/// Income table with one column per entry of `rows`: (revenue, gross profit, net income).
#[cfg(test)]
pub(crate) fn income_table(rows: &[(f64, f64, f64)]) -> crate::analysis::table::StatementTable {
    crate::analysis::table::StatementTable::new(rows.len())
        .with_row(LineItem::TotalRevenue, rows.iter().map(|r| Some(r.0)).collect())
        .with_row(LineItem::GrossProfit, rows.iter().map(|r| Some(r.1)).collect())
        .with_row(LineItem::NetIncome, rows.iter().map(|r| Some(r.2)).collect())
}

/// Balance sheet with one column per entry of `rows`: (equity, long-term debt, current debt).
#[cfg(test)]
pub(crate) fn balance_table(rows: &[(f64, f64, f64)]) -> crate::analysis::table::StatementTable {
    crate::analysis::table::StatementTable::new(rows.len())
        .with_row(LineItem::StockholderEquity, rows.iter().map(|r| Some(r.0)).collect())
        .with_row(LineItem::LongTermDebt, rows.iter().map(|r| Some(r.1)).collect())
        .with_row(LineItem::CurrentDebt, rows.iter().map(|r| Some(r.2)).collect())
}
