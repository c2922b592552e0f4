//! Ratios derived from extracted facts.

use kessan_data::edinet::FinancialFacts;
use serde::Serialize;

/// Four ratios; each is `None` when it cannot be computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    /// Operating income / revenue
    pub operating_margin: Option<f64>,
    /// Net income / revenue
    pub net_margin: Option<f64>,
    /// Total equity / total assets
    pub equity_ratio: Option<f64>,
    /// Cash and equivalents / total assets
    pub cash_ratio: Option<f64>,
}

impl DerivedMetrics {
    /// Compute every ratio from `facts`.
    pub fn from_facts(facts: &FinancialFacts) -> Self {
        Self {
            operating_margin: safe_div(facts.operating_income, facts.sales_amount),
            net_margin: safe_div(facts.net_income, facts.sales_amount),
            equity_ratio: safe_div(facts.total_equity, facts.total_assets),
            cash_ratio: safe_div(facts.cash_and_equivalents, facts.total_assets),
        }
    }
}

/// `numerator / denominator`, or `None` if either is missing, the
/// denominator is zero, or the result is not finite.
pub fn safe_div(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    if d == 0.0 {
        return None;
    }
    Some(n / d).filter(|r| r.is_finite())
}
