use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Headline performance of one backtest run.
///
/// Percentage fields are already multiplied by 100. Every decimal field is
/// rounded to 2 places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Percent change from the first to the last portfolio value.
    pub total_return: Decimal,
    /// `total_return` scaled to a 365-day year. Zero when no time elapsed.
    pub annual_return: Decimal,
    /// Largest peak-to-trough decline, in percent of the peak.
    pub max_drawdown: Decimal,
    /// Number of sell events. A round trip is counted once, at its close.
    pub trade_count: usize,
    pub win_rate: Decimal,
    pub sharpe_ratio: Decimal,
    /// Mean P&L per paired round trip, in account currency.
    pub avg_trade: Decimal,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            total_return: Decimal::ZERO,
            annual_return: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            trade_count: 0,
            win_rate: Decimal::ZERO,
            sharpe_ratio: Decimal::ZERO,
            avg_trade: Decimal::ZERO,
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
