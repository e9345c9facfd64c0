use crate::error::AnalyticsError;
use crate::report::PerformanceMetrics;
use core_types::time::MILLIS_PER_DAY;
use core_types::{PositionSnapshot, TradeEvent};
use ledger::{Ledger, order_snapshots};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

/// Trading periods per year used to annualize the Sharpe ratio.
const SHARPE_PERIODS_PER_YEAR: u32 = 252;
/// Calendar days per year used to annualize the total return.
const CALENDAR_DAYS_PER_YEAR: u32 = 365;

/// `(timestamp, total_value)` pairs in ascending timestamp order.
pub fn value_series(snapshots: &[PositionSnapshot]) -> Vec<(i64, Decimal)> {
    order_snapshots(snapshots)
        .into_iter()
        .map(|s| (s.timestamp, s.total_value))
        .collect()
}

/// A stateless calculator for deriving performance metrics from a backtest's
/// value series and its reconstructed ledger.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The main entry point for calculating performance metrics.
    ///
    /// # Arguments
    ///
    /// * `value_series` - `(epoch_ms, total_value)` in ascending timestamp order.
    /// * `ledger` - Trades inferred from the same snapshots.
    pub fn compute_metrics(
        &self,
        value_series: &[(i64, Decimal)],
        ledger: &Ledger,
    ) -> Result<PerformanceMetrics, AnalyticsError> {
        let mut metrics = PerformanceMetrics::new();

        self.calculate_returns(value_series, &mut metrics);
        self.calculate_drawdown(value_series, &mut metrics);
        self.calculate_trade_stats(ledger, &mut metrics);
        metrics.sharpe_ratio = self.calculate_sharpe(value_series)?;

        metrics.total_return = metrics.total_return.round_dp(2);
        metrics.annual_return = metrics.annual_return.round_dp(2);
        metrics.max_drawdown = metrics.max_drawdown.round_dp(2);
        metrics.win_rate = metrics.win_rate.round_dp(2);
        metrics.sharpe_ratio = metrics.sharpe_ratio.round_dp(2);
        metrics.avg_trade = metrics.avg_trade.round_dp(2);

        tracing::debug!(?metrics, "Performance metrics computed.");
        Ok(metrics)
    }

    fn calculate_returns(&self, value_series: &[(i64, Decimal)], metrics: &mut PerformanceMetrics) {
        let (Some(&(first_ts, first)), Some(&(last_ts, last))) =
            (value_series.first(), value_series.last())
        else {
            return;
        };
        if first.is_zero() {
            return;
        }

        let total = (last - first) / first;
        metrics.total_return = total * Decimal::ONE_HUNDRED;

        let elapsed_days = Decimal::from(last_ts - first_ts) / Decimal::from(MILLIS_PER_DAY);
        if elapsed_days > Decimal::ZERO {
            metrics.annual_return =
                total * Decimal::from(CALENDAR_DAYS_PER_YEAR) / elapsed_days * Decimal::ONE_HUNDRED;
        }
    }

    /// Running-peak scan; each point's drawdown is relative to the highest
    /// value seen so far.
    fn calculate_drawdown(
        &self,
        value_series: &[(i64, Decimal)],
        metrics: &mut PerformanceMetrics,
    ) {
        let Some(&(_, mut peak)) = value_series.first() else {
            return;
        };
        let mut max_drawdown = Decimal::ZERO;

        for &(_timestamp, value) in value_series {
            if value > peak {
                peak = value;
            }
            if peak > Decimal::ZERO {
                let drawdown = (peak - value) / peak;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }

        metrics.max_drawdown = max_drawdown * Decimal::ONE_HUNDRED;
    }

    /// Pairs the i-th buy with the i-th sell of each symbol.
    fn calculate_trade_stats(&self, ledger: &Ledger, metrics: &mut PerformanceMetrics) {
        let mut wins = 0usize;
        let mut pairs = 0usize;
        let mut total_pnl = Decimal::ZERO;

        for trades in ledger.values() {
            metrics.trade_count += trades.sell.len();

            let mut buys: Vec<&TradeEvent> = trades.buy.iter().collect();
            let mut sells: Vec<&TradeEvent> = trades.sell.iter().collect();
            buys.sort_by_key(|t| t.timestamp);
            sells.sort_by_key(|t| t.timestamp);

            for (buy, sell) in buys.iter().zip(sells.iter()) {
                let pnl = round_trip_pnl(buy, sell);
                pairs += 1;
                total_pnl += pnl;
                if pnl > Decimal::ZERO {
                    wins += 1;
                }
            }
        }

        if metrics.trade_count > 0 {
            metrics.win_rate =
                Decimal::from(wins) / Decimal::from(metrics.trade_count) * Decimal::ONE_HUNDRED;
        }
        if pairs > 0 {
            metrics.avg_trade = total_pnl / Decimal::from(pairs);
        }
    }

    /// Simplified Sharpe: mean over population standard deviation of the
    /// per-period simple returns, scaled by `sqrt(252)`. No risk-free rate.
    fn calculate_sharpe(&self, value_series: &[(i64, Decimal)]) -> Result<Decimal, AnalyticsError> {
        let returns: Vec<Decimal> = value_series
            .windows(2)
            .filter(|w| !w[0].1.is_zero())
            .map(|w| (w[1].1 - w[0].1) / w[0].1)
            .collect();

        if returns.is_empty() {
            return Ok(Decimal::ZERO);
        }

        let count = Decimal::from(returns.len());
        let mean = returns.iter().sum::<Decimal>() / count;
        let variance = returns
            .iter()
            .map(|r| (*r - mean) * (*r - mean))
            .sum::<Decimal>()
            / count;

        if variance <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        let std_dev = variance.sqrt().ok_or_else(|| {
            AnalyticsError::InternalError("Failed to take the square root of the variance".into())
        })?;
        if std_dev.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let annualizer = Decimal::from(SHARPE_PERIODS_PER_YEAR).sqrt().ok_or_else(|| {
            AnalyticsError::InternalError("Failed to calculate annualization factor".to_string())
        })?;

        Ok(mean / std_dev * annualizer)
    }
}

/// P&L of one paired round trip, and so its win/loss sign.
///
/// Notional (`price * size`) is compared when both legs carry a positive
/// price and size, then the reconciled `amount`, then bare price.
fn round_trip_pnl(buy: &TradeEvent, sell: &TradeEvent) -> Decimal {
    let has_notional = |t: &TradeEvent| t.price > Decimal::ZERO && t.size > Decimal::ZERO;
    if has_notional(buy) && has_notional(sell) {
        return sell.price * sell.size - buy.price * buy.size;
    }
    if buy.amount > Decimal::ZERO && sell.amount > Decimal::ZERO {
        return sell.amount - buy.amount;
    }
    sell.price - buy.price
}
