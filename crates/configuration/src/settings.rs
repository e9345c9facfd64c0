use crate::error::ConfigError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub mqtt: MqttConfig,
    pub simulation: Simulation,
    pub listen: ListenConfig,
    pub reconciliation: Reconciliation,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Rejects values that would make a backtest run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "upstream.base_url must not be empty".to_string(),
            ));
        }
        let tolerance = self.reconciliation.tolerance;
        if tolerance <= Decimal::ZERO || tolerance > Decimal::ONE {
            return Err(ConfigError::ValidationError(format!(
                "reconciliation.tolerance must be in (0, 1], got {}",
                self.reconciliation.tolerance
            )));
        }
        if self.simulation.capital <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "simulation.capital must be positive".to_string(),
            ));
        }
        if self.listen.max_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "listen.max_seconds must be at least 1".to_string(),
            ));
        }
        if self.mqtt.handshake_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "mqtt.handshake_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !self.mqtt.topic_template.contains("{client_id}") {
            return Err(ConfigError::ValidationError(format!(
                "mqtt.topic_template '{}' must contain the {{client_id}} placeholder",
                self.mqtt.topic_template
            )));
        }
        Ok(())
    }
}

/// Connection settings for the broker's HTTP API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Session token sent with every authenticated request.
    pub token: String,
    pub user_id: String,
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            token: String::new(),
            user_id: String::new(),
            request_timeout_secs: 30,
        }
    }
}

/// Connection settings for the broker's message bus.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    /// How long `connect` waits for the broker's CONNACK.
    pub handshake_timeout_secs: u64,
    /// Position-update topic; `{client_id}` is replaced by the session's client id.
    pub topic_template: String,
    /// Capacity of the channel between the receive worker and the listen loop.
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            keep_alive_secs: 30,
            handshake_timeout_secs: 10,
            topic_template: "position/{client_id}".to_string(),
            channel_capacity: 4096,
        }
    }
}

/// How the broker settles fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SettlementMode {
    /// Same-day settlement.
    #[serde(rename = "T+0")]
    T0,
    /// Next-day settlement, the A-share default.
    #[serde(rename = "T+1")]
    T1,
}

/// Fixed simulation parameters sent with every backtest job.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Simulation {
    /// Starting capital of the simulated account.
    pub capital: Decimal,
    /// Shares per order.
    pub order_size: Decimal,
    /// Margin ratio; 1 means fully funded.
    pub margin: Decimal,
    /// Commission rate per fill, 0.0003 is 0.03%.
    pub commission: Decimal,
    /// Annual risk-free rate.
    pub risk_free_rate: Decimal,
    /// Maximum number of same-direction entries.
    pub pyramiding: u32,
    /// Bar resolution, e.g. `1d`.
    pub resolution: String,
    pub settlement: SettlementMode,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            capital: dec!(1000000),
            order_size: dec!(100),
            margin: dec!(1),
            commission: dec!(0.0003),
            risk_free_rate: dec!(0.02),
            pyramiding: 1,
            resolution: "1d".to_string(),
            settlement: SettlementMode::T1,
        }
    }
}

/// Bounds for waiting on streamed backtest results.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub max_seconds: u64,
    pub show_progress: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            max_seconds: 300,
            show_progress: false,
        }
    }
}

/// Tolerance band for choosing between a cash-delta and a price x size trade amount.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Reconciliation {
    /// 0.20 accepts a cash-delta estimate within 20% of price x size.
    pub tolerance: Decimal,
}

impl Default for Reconciliation {
    fn default() -> Self {
        Self { tolerance: dec!(0.20) }
    }
}

/// Where run artifacts (record dumps, chart data) are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    pub level: String,
    /// Enables a daily-rolling log file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "quantlink.log".to_string(),
        }
    }
}
