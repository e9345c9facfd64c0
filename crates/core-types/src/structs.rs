use crate::enums::TradeSide;
use crate::error::CoreError;
use crate::numeric::{decimal_field, i64_from_json};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A tradable instrument identified as `SYMBOL.EXCHANGE` (e.g. `600000.XSHG`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub exchange: String,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
        }
    }

    /// Parses a `SYMBOL.EXCHANGE` token, returning `None` unless it splits on
    /// exactly one `.` into two non-empty parts.
    pub fn parse(token: &str) -> Option<Self> {
        let (symbol, exchange) = token.trim().split_once('.')?;
        if symbol.is_empty() || exchange.is_empty() || exchange.contains('.') {
            return None;
        }
        Some(Self::new(symbol, exchange))
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.symbol, self.exchange)
    }
}

impl FromStr for Instrument {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            let reason = format!("'{s}' is not SYMBOL.EXCHANGE");
            CoreError::InvalidInput("instrument".to_string(), reason)
        })
    }
}

/// Listing metadata for an instrument, used to bound backtest date ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentInfo {
    pub instrument_id: String,
    pub name: Option<String>,
    pub listing_date: Option<NaiveDate>,
    pub last_trade_date: Option<NaiveDate>,
}

/// A single OHLCV bar of historical price data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub interval: String,
}

/// An instrument holding inside a snapshot (`category = 1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub exchange: String,
    pub size: Decimal,
    pub price: Decimal,
    pub value: Decimal,
}

/// One entry of a snapshot's `positions` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PositionEntry {
    /// `category = 0`.
    Cash { value: Decimal },
    /// `category = 1`.
    Holding(Holding),
}

/// One point-in-time broker report of cash and holdings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub total_value: Decimal,
    pub positions: Vec<PositionEntry>,
}

impl PositionSnapshot {
    /// Builds a snapshot from a decoded broker record.
    ///
    /// Returns `None` when the record has no usable `timestamp` or no
    /// `positions` array. Entries with an unknown category or an instrument
    /// entry without a symbol are skipped.
    pub fn from_json(record: &Value) -> Option<Self> {
        let timestamp = record.get("timestamp").and_then(i64_from_json)?;
        let raw_positions = record.get("positions")?.as_array()?;
        let total_value =
            decimal_field(record, &["totalValue", "total_value"]).unwrap_or(Decimal::ZERO);

        let positions = raw_positions.iter().filter_map(PositionEntry::from_json).collect();

        Some(Self {
            timestamp,
            total_value,
            positions,
        })
    }

    /// The cash balance, if the snapshot carries a cash entry.
    pub fn cash(&self) -> Option<Decimal> {
        self.positions.iter().find_map(|p| match p {
            PositionEntry::Cash { value } => Some(*value),
            PositionEntry::Holding(_) => None,
        })
    }

    /// Iterates over instrument holdings, skipping the cash entry.
    pub fn holdings(&self) -> impl Iterator<Item = &Holding> {
        self.positions.iter().filter_map(|p| match p {
            PositionEntry::Holding(h) => Some(h),
            PositionEntry::Cash { .. } => None,
        })
    }

    pub fn holding(&self, symbol: &str) -> Option<&Holding> {
        self.holdings().find(|h| h.symbol == symbol)
    }
}

impl PositionEntry {
    fn from_json(entry: &Value) -> Option<Self> {
        let category = entry.get("category").and_then(i64_from_json)?;
        match category {
            0 => Some(PositionEntry::Cash {
                value: decimal_field(entry, &["value"]).unwrap_or(Decimal::ZERO),
            }),
            1 => {
                let symbol = entry.get("symbol")?.as_str()?.to_string();
                let exchange = entry
                    .get("exchange")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let size = decimal_field(entry, &["size"]).unwrap_or(Decimal::ZERO);
                let price = decimal_field(entry, &["price"]).unwrap_or(Decimal::ZERO);
                let value = decimal_field(entry, &["value"]).unwrap_or(size * price);
                Some(PositionEntry::Holding(Holding {
                    symbol,
                    exchange,
                    size,
                    price,
                    value,
                }))
            }
            _ => None,
        }
    }
}

/// A trade inferred from the size change of one symbol between two
/// timestamp-adjacent snapshots. Never observed directly on the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub symbol: String,
    pub side: TradeSide,
    /// Epoch milliseconds of the snapshot where the change was observed.
    pub timestamp: i64,
    pub price: Decimal,
    pub size: Decimal,
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parses_instrument_tokens() {
        assert_eq!(Instrument::parse("600000.XSHG"), Some(Instrument::new("600000", "XSHG")));
        assert_eq!(Instrument::parse(" 000001.XSHE "), Some(Instrument::new("000001", "XSHE")));
        assert_eq!(Instrument::parse("600000"), None);
        assert_eq!(Instrument::parse(".XSHG"), None);
        assert_eq!(Instrument::parse("a.b.c"), None);
        assert!("bad".parse::<Instrument>().is_err());
    }

    #[test]
    fn snapshot_from_broker_record() {
        let record = json!({
            "timestamp": 1_704_067_200_000_i64,
            "totalValue": "100000.5",
            "positions": [
                {"category": 0, "value": 90000},
                {
                    "category": 1,
                    "symbol": "600000",
                    "exchange": "XSHG",
                    "size": 1000,
                    "price": 10.5
                },
                {"category": 7, "value": 1}
            ]
        });
        let snapshot = PositionSnapshot::from_json(&record).unwrap();
        assert_eq!(snapshot.timestamp, 1_704_067_200_000);
        assert_eq!(snapshot.total_value, dec!(100000.5));
        assert_eq!(snapshot.cash(), Some(dec!(90000)));
        let holding = snapshot.holding("600000").unwrap();
        assert_eq!(holding.size, dec!(1000));
        assert_eq!(holding.value, dec!(10500));
        assert_eq!(snapshot.positions.len(), 2);
    }

    #[test]
    fn snapshot_requires_timestamp_and_positions() {
        assert!(PositionSnapshot::from_json(&json!({"positions": []})).is_none());
        assert!(PositionSnapshot::from_json(&json!({"timestamp": 1})).is_none());
        assert!(PositionSnapshot::from_json(&json!({"timestamp": 1, "positions": {}})).is_none());
    }
}
