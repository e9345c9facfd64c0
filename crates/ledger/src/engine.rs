use crate::snapshots::order_snapshots;
use core_types::{PositionSnapshot, TradeEvent, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How far a cash-derived trade amount may stray from `price * size` before
/// the standard estimate is used instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconciliationPolicy {
    /// Relative tolerance, e.g. `0.20` for 20%.
    pub tolerance: Decimal,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            tolerance: Decimal::new(20, 2),
        }
    }
}

impl ReconciliationPolicy {
    pub fn new(tolerance: Decimal) -> Self {
        Self { tolerance }
    }

    /// Picks the cash-derived amount when it agrees with the standard
    /// estimate, otherwise falls back to the standard estimate.
    fn settle(&self, standard: Decimal, cash_estimate: Option<Decimal>) -> Decimal {
        let Some(cash) = cash_estimate else {
            return standard;
        };
        let band = standard.abs() * self.tolerance;
        if (cash - standard).abs() > band {
            tracing::debug!(
                %cash,
                %standard,
                "Cash delta disagrees with price * size, using the standard amount."
            );
            standard
        } else {
            cash
        }
    }
}

/// Inferred trades for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTrades {
    pub buy: Vec<TradeEvent>,
    pub sell: Vec<TradeEvent>,
}

impl SymbolTrades {
    fn push(&mut self, event: TradeEvent) {
        match event.side {
            TradeSide::Buy => self.buy.push(event),
            TradeSide::Sell => self.sell.push(event),
        }
    }
}

/// Trades keyed by symbol. Events within each side are in timestamp order.
pub type Ledger = BTreeMap<String, SymbolTrades>;

/// Infers trades from a stream of position snapshots.
///
/// Only timestamp-adjacent snapshots are compared. The first snapshot is a
/// baseline and never produces trades on its own.
#[derive(Debug, Clone, Default)]
pub struct LedgerEngine {
    policy: ReconciliationPolicy,
}

impl LedgerEngine {
    pub fn new(policy: ReconciliationPolicy) -> Self {
        Self { policy }
    }

    pub fn reconstruct(&self, snapshots: &[PositionSnapshot]) -> Ledger {
        let ordered = order_snapshots(snapshots);
        let mut ledger = Ledger::new();

        for pair in ordered.windows(2) {
            let (previous, current) = (pair[0], pair[1]);
            for event in self.diff(previous, current) {
                ledger.entry(event.symbol.clone()).or_default().push(event);
            }
        }

        let (buys, sells) = ledger
            .values()
            .fold((0, 0), |(b, s), t| (b + t.buy.len(), s + t.sell.len()));
        tracing::info!(
            snapshots = ordered.len(),
            symbols = ledger.len(),
            buys,
            sells,
            "Ledger reconstructed."
        );
        ledger
    }

    /// Trades implied by the transition from `previous` to `current`.
    fn diff(&self, previous: &PositionSnapshot, current: &PositionSnapshot) -> Vec<TradeEvent> {
        let cash_delta = match (previous.cash(), current.cash()) {
            (Some(before), Some(after)) => Some(after - before),
            _ => None,
        };
        // Money leaves the account on a buy and arrives on a sell.
        let buy_cash = cash_delta.filter(|d| d.is_sign_negative() && !d.is_zero()).map(|d| d.abs());
        let sell_cash = cash_delta.filter(|d| d.is_sign_positive() && !d.is_zero());

        let mut events = Vec::new();

        for holding in current.holdings() {
            let previous_size = previous
                .holding(&holding.symbol)
                .map_or(Decimal::ZERO, |h| h.size);

            if holding.size > previous_size {
                let size = holding.size - previous_size;
                events.push(self.event(
                    &holding.symbol,
                    TradeSide::Buy,
                    current.timestamp,
                    holding.price,
                    size,
                    buy_cash,
                ));
            } else if holding.size < previous_size {
                let size = previous_size - holding.size;
                events.push(self.event(
                    &holding.symbol,
                    TradeSide::Sell,
                    current.timestamp,
                    holding.price,
                    size,
                    sell_cash,
                ));
            }
        }

        // A symbol that vanished was sold out at its last known price.
        for gone in previous.holdings() {
            if current.holding(&gone.symbol).is_some() || gone.size.is_zero() {
                continue;
            }
            events.push(self.event(
                &gone.symbol,
                TradeSide::Sell,
                current.timestamp,
                gone.price,
                gone.size,
                sell_cash,
            ));
        }

        events
    }

    fn event(
        &self,
        symbol: &str,
        side: TradeSide,
        timestamp: i64,
        price: Decimal,
        size: Decimal,
        cash_estimate: Option<Decimal>,
    ) -> TradeEvent {
        let amount = self.policy.settle(price * size, cash_estimate);
        tracing::debug!(symbol, %side, timestamp, %price, %size, %amount, "Inferred trade.");
        TradeEvent {
            symbol: symbol.to_string(),
            side,
            timestamp,
            price,
            size,
            amount,
        }
    }
}
