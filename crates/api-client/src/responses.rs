use crate::error::ApiError;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::numeric::i64_from_json;
use core_types::time::market_offset;
use core_types::{InstrumentInfo, Kline};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// `rename_all = "camelCase"` maps the broker's JSON keys onto snake_case fields.

/// `code` value the broker uses for success.
pub const SUCCESS_CODE: i64 = 1;

/// The `{code, msg, data}` envelope wrapping every broker API response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(deserialize_with = "lenient_code")]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Parses a response body into an envelope.
    pub fn parse(body: &str) -> Result<Self, ApiError> {
        serde_json::from_str(body).map_err(|e| {
            ApiError::Deserialization(format!("not a broker envelope: {e}. Original text: {body}"))
        })
    }

    /// `Ok(data)` on success, `Err(Upstream)` otherwise.
    pub fn into_data(self) -> Result<Value, ApiError> {
        if self.code == SUCCESS_CODE {
            Ok(self.data)
        } else {
            Err(ApiError::Upstream {
                code: self.code,
                msg: self.msg,
            })
        }
    }

    /// Like `into_data`, then deserializes the payload into `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let data = self.into_data()?;
        serde_json::from_value(data).map_err(|e| ApiError::Deserialization(e.to_string()))
    }
}

fn lenient_code<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    i64_from_json(&value).ok_or_else(|| serde::de::Error::custom(format!("invalid code {value}")))
}

/// Which catalogue a strategy is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyGroup {
    /// Strategies the user created.
    User,
    /// The broker's shared strategy library.
    Library,
}

impl StrategyGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyGroup::User => "user",
            StrategyGroup::Library => "library",
        }
    }
}

/// A stored strategy definition. Each code field is a fragment of the
/// broker's strategy scripting language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDetail {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub indicator: Option<String>,
    #[serde(default)]
    pub timing: Option<String>,
    #[serde(default)]
    pub control_risk: Option<String>,
    #[serde(default)]
    pub choose_stock: Option<String>,
}

/// Message-bus credentials issued for one backtest session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCredentials {
    pub instance_id: String,
    pub client_id: String,
    pub trader_id: String,
    pub username: String,
    pub password: String,
}

/// Extracts the session token from a job-submission response payload.
///
/// The broker returns either the bare token string or an object carrying it.
pub fn session_token(data: &Value) -> Result<String, ApiError> {
    let token = match data {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => ["token", "sessionId", "session_id", "id"]
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
        _ => None,
    };
    token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ApiError::InvalidData(format!("no session token in submission response: {data}"))
        })
}

/// Instrument metadata as the broker sends it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawInstrumentInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "listDate", alias = "listing_date")]
    listing_date: Value,
    #[serde(default, alias = "delistDate", alias = "last_trade_date")]
    last_trade_date: Value,
}

impl RawInstrumentInfo {
    pub(crate) fn into_info(self, instrument_id: &str) -> InstrumentInfo {
        InstrumentInfo {
            instrument_id: instrument_id.to_string(),
            name: self.name,
            listing_date: parse_upstream_date(&self.listing_date),
            last_trade_date: parse_upstream_date(&self.last_trade_date),
        }
    }
}

/// Reads a date sent as `YYYY-MM-DD`, `YYYYMMDD`, or epoch milliseconds.
pub fn parse_upstream_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
                .ok()
                .or_else(|| s.parse::<i64>().ok().and_then(date_from_millis))
        }
        Value::Number(_) => i64_from_json(value).and_then(date_from_millis),
        _ => None,
    }
}

fn date_from_millis(millis: i64) -> Option<NaiveDate> {
    // Eight-digit integers are compact dates, not timestamps.
    if (10_000_000..100_000_000).contains(&millis) {
        return NaiveDate::parse_from_str(&millis.to_string(), "%Y%m%d").ok();
    }
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&market_offset()).date_naive())
}

/// One bar of the K-line history endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct RawKline {
    #[serde(alias = "timestamp", alias = "t")]
    time: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    #[serde(default)]
    volume: Decimal,
}

impl RawKline {
    pub(crate) fn into_kline(self, interval: &str) -> Result<Kline, ApiError> {
        let open_time = DateTime::<Utc>::from_timestamp_millis(self.time)
            .ok_or_else(|| ApiError::InvalidData(format!("Invalid open_time: {}", self.time)))?;
        Ok(Kline {
            open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            interval: interval.to_string(),
        })
    }
}
