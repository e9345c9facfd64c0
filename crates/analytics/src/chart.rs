use core_types::time::format_millis;
use core_types::{Kline, PositionSnapshot, TradeEvent};
use ledger::{Ledger, order_snapshots};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A trade marker on the value chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePoint {
    pub date: String,
    pub timestamp: i64,
    pub price: Decimal,
    pub size: Decimal,
    pub amount: Decimal,
}

impl From<&TradeEvent> for TradePoint {
    fn from(event: &TradeEvent) -> Self {
        Self {
            date: render_date(event.timestamp),
            timestamp: event.timestamp,
            price: event.price,
            size: event.size,
            amount: event.amount,
        }
    }
}

/// One bar of the price overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub date: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl From<&Kline> for PricePoint {
    fn from(kline: &Kline) -> Self {
        Self {
            date: render_date(kline.open_time.timestamp_millis()),
            open: kline.open,
            high: kline.high,
            low: kline.low,
            close: kline.close,
            volume: kline.volume,
        }
    }
}

/// Everything a renderer needs to draw a backtest, already aligned.
///
/// The value series share one index: `dates[i]`, `total_value_series[i]`,
/// `cash_series[i]` and `position_value_series[i]` describe the same snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub dates: Vec<String>,
    pub total_value_series: Vec<Decimal>,
    pub cash_series: Vec<Decimal>,
    pub position_value_series: Vec<Decimal>,
    pub buy_points_by_symbol: BTreeMap<String, Vec<TradePoint>>,
    pub sell_points_by_symbol: BTreeMap<String, Vec<TradePoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_series: Option<Vec<PricePoint>>,
}

/// Merges the value series, the ledger and an optional price history.
pub fn assemble(
    snapshots: &[PositionSnapshot],
    ledger: &Ledger,
    price_history: Option<&[Kline]>,
) -> ChartData {
    let mut chart = ChartData::default();

    for snapshot in order_snapshots(snapshots) {
        let cash = snapshot.cash().unwrap_or(Decimal::ZERO);
        // Cash and total value are not always reported at the same instant.
        let position_value = (snapshot.total_value - cash).max(Decimal::ZERO);

        chart.dates.push(render_date(snapshot.timestamp));
        chart.total_value_series.push(snapshot.total_value);
        chart.cash_series.push(cash);
        chart.position_value_series.push(position_value);
    }

    for (symbol, trades) in ledger {
        if !trades.buy.is_empty() {
            chart
                .buy_points_by_symbol
                .insert(symbol.clone(), trades.buy.iter().map(TradePoint::from).collect());
        }
        if !trades.sell.is_empty() {
            chart
                .sell_points_by_symbol
                .insert(symbol.clone(), trades.sell.iter().map(TradePoint::from).collect());
        }
    }

    chart.price_series = price_history.map(|klines| {
        let mut points: Vec<&Kline> = klines.iter().collect();
        points.sort_by_key(|k| k.open_time);
        points.into_iter().map(PricePoint::from).collect()
    });

    chart
}

fn render_date(millis: i64) -> String {
    format_millis(millis).unwrap_or_else(|| millis.to_string())
}
