use crate::config::CASH_CONVERSION_RATIO;
use crate::types::CashQuality;

/// Profitable companies must convert at least 70% of net income into free cash flow.
pub fn classify(net_income: f64, free_cash_flow: f64) -> CashQuality {
    if net_income > 0.0 && free_cash_flow < net_income * CASH_CONVERSION_RATIO {
        CashQuality::Suspicious
    } else {
        CashQuality::Verified
    }
}
