//! Year-indexed statement tables: a fixed set of known line items mapped to
//! one value per period, most recent period first.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::analysis::sanitize::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LineItem {
    TotalRevenue,
    GrossProfit,
    NetIncome,
    LongTermDebt,
    CurrentDebt,
    ShortLongTermDebt,
    StockholderEquity,
    FreeCashFlow,
    OperatingCashFlow,
    CapitalExpenditure,
}

impl LineItem {
    pub fn label(&self) -> &'static str {
        match self {
            LineItem::TotalRevenue => "Total Revenue",
            LineItem::GrossProfit => "Gross Profit",
            LineItem::NetIncome => "Net Income",
            LineItem::LongTermDebt => "Long Term Debt",
            LineItem::CurrentDebt => "Current Debt",
            LineItem::ShortLongTermDebt => "Short Long Term Debt",
            LineItem::StockholderEquity => "Total Stockholder Equity",
            LineItem::FreeCashFlow => "Free Cash Flow",
            LineItem::OperatingCashFlow => "Operating Cash Flow",
            LineItem::CapitalExpenditure => "Capital Expenditure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("line item '{}' not present", .0.label())]
    MissingLine(LineItem),

    #[error("period {index} out of range ({periods} periods)")]
    MissingPeriod { index: usize, periods: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementTable {
    periods: usize,
    rows: BTreeMap<LineItem, Vec<Option<f64>>>,
}

impl StatementTable {
    pub fn new(periods: usize) -> Self {
        Self {
            periods,
            rows: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) a row. The row is padded or truncated to the table's period count.
    pub fn with_row(mut self, item: LineItem, mut values: Vec<Option<f64>>) -> Self {
        values.resize(self.periods, None);
        self.rows.insert(item, values);
        self
    }

    pub fn periods(&self) -> usize {
        self.periods
    }

    pub fn is_empty(&self) -> bool {
        self.periods == 0 || self.rows.is_empty()
    }

    pub fn has(&self, item: LineItem) -> bool {
        self.rows.contains_key(&item)
    }

    /// Sanitized value of `item` for period `index`.
    pub fn get(&self, item: LineItem, index: usize) -> Result<f64, TableError> {
        self.cell(item, index).map(sanitize)
    }

    /// Unsanitized cell. `Ok(None)` when the cell is empty or not finite.
    pub fn cell(&self, item: LineItem, index: usize) -> Result<Option<f64>, TableError> {
        let row = self.rows.get(&item).ok_or(TableError::MissingLine(item))?;
        let cell = row.get(index).ok_or(TableError::MissingPeriod {
            index,
            periods: self.periods,
        })?;
        Ok(cell.filter(|v| v.is_finite()))
    }

    /// `Some(value)` when the line is present, `None` when it is absent.
    pub fn optional(&self, item: LineItem, index: usize) -> Result<Option<f64>, TableError> {
        if !self.has(item) {
            return Ok(None);
        }
        self.get(item, index).map(Some)
    }

    /// First present line of `chain`, in order. `None` when none is present.
    pub fn first_present(
        &self,
        chain: &[LineItem],
        index: usize,
    ) -> Result<Option<f64>, TableError> {
        match chain.iter().find(|item| self.has(**item)) {
            Some(item) => self.get(*item, index).map(Some),
            None => Ok(None),
        }
    }
}
