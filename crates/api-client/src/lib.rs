use crate::auth::session_headers;
use crate::error::ApiError;
use async_trait::async_trait;
use chrono::NaiveDate;
use configuration::UpstreamConfig;
use core_types::time::{day_end_millis, day_start_millis};
use core_types::{Instrument, InstrumentInfo, Kline};
use responses::{Envelope, RawInstrumentInfo, RawKline};
use serde_json::Value;
use std::time::Duration;

pub mod auth;
pub mod error;
pub mod live_connector;
pub mod responses;
// --- Public API ---
pub use auth::Session;
pub use live_connector::{IngestClient, forward_payload};
pub use responses::{ConnectionCredentials, StrategyDetail, StrategyGroup};

const STRATEGY_DETAIL_PATH: &str = "/api/strategy/detail";
const BACKTEST_SUBMIT_PATH: &str = "/api/backtest/submit";
const CREDENTIALS_PATH: &str = "/api/trader/credentials";
const INSTRUMENT_INFO_PATH: &str = "/api/instrument/info";
const KLINE_HISTORY_PATH: &str = "/api/kline/history";

/// The narrow contract this workspace needs from the broker's HTTP API.
///
/// The orchestration layer only talks to this trait, so tests can drive a
/// whole backtest run against an in-memory implementation.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Looks up a stored strategy definition in one group.
    async fn fetch_strategy(
        &self,
        strategy_id: &str,
        group: StrategyGroup,
    ) -> Result<StrategyDetail, ApiError>;

    /// Submits a backtest job and returns the broker's session token.
    async fn submit_backtest(&self, payload: &Value) -> Result<String, ApiError>;

    /// Issues message-bus credentials for a new backtest session.
    async fn issue_credentials(&self) -> Result<ConnectionCredentials, ApiError>;

    /// Fetches listing metadata for an instrument id such as `600000.XSHG`.
    async fn fetch_instrument(&self, instrument_id: &str) -> Result<InstrumentInfo, ApiError>;

    /// Fetches historical bars, oldest first.
    async fn fetch_klines(
        &self,
        instrument: &Instrument,
        from: NaiveDate,
        to: NaiveDate,
        resolution: &str,
    ) -> Result<Vec<Kline>, ApiError>;
}

/// `UpstreamApi` over HTTP with the `{code, msg, data}` envelope.
#[derive(Clone)]
pub struct HttpUpstreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstreamClient {
    pub fn new(config: &UpstreamConfig, session: &Session) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .default_headers(session_headers(session)?)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_envelope(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Envelope, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        Self::read_envelope(path, response).await
    }

    async fn post_envelope(&self, path: &str, body: &Value) -> Result<Envelope, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        Self::read_envelope(path, response).await
    }

    async fn read_envelope(path: &str, response: reqwest::Response) -> Result<Envelope, ApiError> {
        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(path, status = status.as_u16(), bytes = text.len(), "Broker API response.");

        if status.is_success() {
            Envelope::parse(&text)
        } else {
            // Error responses usually still carry the envelope; prefer its message.
            match Envelope::parse(&text) {
                Ok(envelope) => Err(ApiError::Upstream {
                    code: envelope.code,
                    msg: envelope.msg,
                }),
                Err(_) => Err(ApiError::Http {
                    status: status.as_u16(),
                    body: text,
                }),
            }
        }
    }
}

#[async_trait]
impl UpstreamApi for HttpUpstreamClient {
    async fn fetch_strategy(
        &self,
        strategy_id: &str,
        group: StrategyGroup,
    ) -> Result<StrategyDetail, ApiError> {
        let query = [
            ("id", strategy_id.to_string()),
            ("group", group.as_str().to_string()),
        ];
        let data = self.get_envelope(STRATEGY_DETAIL_PATH, &query).await?.into_data()?;
        if data.is_null() {
            return Err(ApiError::Upstream {
                code: 0,
                msg: format!("strategy {strategy_id} not found in {} group", group.as_str()),
            });
        }
        serde_json::from_value(data).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    async fn submit_backtest(&self, payload: &Value) -> Result<String, ApiError> {
        let data = self.post_envelope(BACKTEST_SUBMIT_PATH, payload).await?.into_data()?;
        responses::session_token(&data)
    }

    async fn issue_credentials(&self) -> Result<ConnectionCredentials, ApiError> {
        self.post_envelope(CREDENTIALS_PATH, &Value::Object(Default::default()))
            .await?
            .into_typed()
    }

    async fn fetch_instrument(&self, instrument_id: &str) -> Result<InstrumentInfo, ApiError> {
        let query = [("id", instrument_id.to_string())];
        let raw: RawInstrumentInfo = self
            .get_envelope(INSTRUMENT_INFO_PATH, &query)
            .await?
            .into_typed()?;
        Ok(raw.into_info(instrument_id))
    }

    async fn fetch_klines(
        &self,
        instrument: &Instrument,
        from: NaiveDate,
        to: NaiveDate,
        resolution: &str,
    ) -> Result<Vec<Kline>, ApiError> {
        let query = [
            ("symbol", instrument.symbol.clone()),
            ("exchange", instrument.exchange.clone()),
            ("from", day_start_millis(from).to_string()),
            ("to", day_end_millis(to).to_string()),
            ("resolution", resolution.to_string()),
        ];
        let raw: Vec<RawKline> = self
            .get_envelope(KLINE_HISTORY_PATH, &query)
            .await?
            .into_typed()?;

        let mut klines = raw
            .into_iter()
            .map(|k| k.into_kline(resolution))
            .collect::<Result<Vec<Kline>, ApiError>>()?;
        klines.sort_by_key(|k| k.open_time);

        Ok(klines)
    }
}
