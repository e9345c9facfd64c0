//! # Backtest Orchestration
//!
//! Drives one remote backtest from strategy resolution to chart output:
//! resolve the strategy, validate dates, connect the ingest stream, submit the
//! job, listen for position snapshots, then reconstruct the ledger and
//! compute metrics and chart data locally.

use crate::output::{output_stem, write_records};
use analytics::{AnalyticsEngine, PerformanceMetrics, assemble, value_series};
use api_client::{IngestClient, UpstreamApi};
use chrono::Utc;
use configuration::Config;
use events::IngestRecord;
use ledger::{LedgerEngine, ReconciliationPolicy, snapshots_from_records};
use serde::Serialize;
use strategies::{StrategyError, StrategyOverrides, StrategyResolver};
use tokio::sync::mpsc;

pub mod dates;
pub mod error;
pub mod ingest;
pub mod listener;
pub mod output;
pub mod submission;

// --- Public API ---
pub use dates::{DateRangeValidator, DateValidationResult, parse_loose_date};
pub use error::BacktestError;
pub use ingest::IngestSession;
pub use listener::{ListenExit, ListenLoop, ListenOutcome};
pub use output::{ChartRenderer, JsonChartRenderer};
pub use submission::{JobSubmitter, SubmissionPayload};

/// What the caller asks for. Dates are free-form strings.
#[derive(Debug, Clone, Default)]
pub struct BacktestRequest {
    pub strategy_id: String,
    /// Instrument whose trading dates bound the range; defaults to the
    /// strategy's first instrument.
    pub instrument_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub overrides: StrategyOverrides,
    /// Overrides `listen.max_seconds` for this run.
    pub max_seconds: Option<u64>,
}

/// The outcome of one run. `success == false` always comes with `error`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRunResult {
    pub success: bool,
    pub strategy_name: String,
    pub position_count: usize,
    /// Records kept as hex because they could not be decoded.
    pub raw_count: usize,
    pub file_path: String,
    pub chart_path: String,
    pub date_validation: Option<DateValidationResult>,
    pub error: Option<String>,
    pub metrics: Option<PerformanceMetrics>,
}

impl BacktestRunResult {
    fn started(strategy_id: &str) -> Self {
        Self {
            success: false,
            strategy_name: strategy_id.to_string(),
            position_count: 0,
            raw_count: 0,
            file_path: String::new(),
            chart_path: String::new(),
            date_validation: None,
            error: None,
            metrics: None,
        }
    }
}

pub struct BacktestRunner<'a> {
    api: &'a dyn UpstreamApi,
    config: &'a Config,
    renderer: Box<dyn ChartRenderer>,
}

impl<'a> BacktestRunner<'a> {
    pub fn new(api: &'a dyn UpstreamApi, config: &'a Config) -> Self {
        Self {
            api,
            config,
            renderer: Box::new(JsonChartRenderer::new(&config.output.directory)),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn ChartRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Runs a backtest over a fresh MQTT ingest client.
    ///
    /// Never fails: run-fatal errors are reported in the result.
    pub async fn run(&self, request: &BacktestRequest) -> BacktestRunResult {
        let (client, records) = IngestClient::new(&self.config.mqtt);
        self.run_with(request, client, records).await
    }

    /// Runs a backtest over any ingest session and its record channel.
    pub async fn run_with<S: IngestSession>(
        &self,
        request: &BacktestRequest,
        mut session: S,
        mut records: mpsc::Receiver<IngestRecord>,
    ) -> BacktestRunResult {
        let mut result = BacktestRunResult::started(&request.strategy_id);
        match self.execute(request, &mut session, &mut records, &mut result).await {
            Ok(()) => result.success = true,
            Err(e) => {
                tracing::error!(
                    strategy_id = %request.strategy_id,
                    error = %e,
                    "Backtest run failed."
                );
                result.error = Some(e.to_string());
            }
        }
        result
    }

    async fn execute<S: IngestSession>(
        &self,
        request: &BacktestRequest,
        session: &mut S,
        records: &mut mpsc::Receiver<IngestRecord>,
        result: &mut BacktestRunResult,
    ) -> Result<(), BacktestError> {
        // --- 1. Strategy and dates ---
        let strategy = StrategyResolver::new(self.api)
            .resolve(&request.strategy_id, &request.overrides)
            .await?;
        result.strategy_name = strategy.name.clone();

        let primary = strategy
            .primary_instrument()
            .cloned()
            .ok_or_else(|| StrategyError::Extraction("no instruments to trade".to_string()))?;
        let primary_id = primary.to_string();
        let instrument_id = request.instrument_id.as_deref().unwrap_or(&primary_id);
        let dates = DateRangeValidator::new(self.api)
            .validate(Some(instrument_id), request.from.as_deref(), request.to.as_deref())
            .await;
        let (from, to) = (dates.adjusted_from, dates.adjusted_to);
        result.date_validation = Some(dates);

        // --- 2. Connect before submitting so no early snapshot is missed ---
        let credentials = self.api.issue_credentials().await?;
        session.connect(&credentials).await?;

        let submitted = JobSubmitter::new(self.api, &self.config.simulation)
            .submit(&strategy, from, to, &credentials)
            .await;
        if let Err(e) = submitted {
            session.disconnect().await;
            return Err(e);
        }

        // --- 3. Listen ---
        let mut listen_loop = ListenLoop::new(&self.config.listen);
        if let Some(max_seconds) = request.max_seconds {
            listen_loop = listen_loop.with_max_seconds(max_seconds);
        }
        let outcome = listen_loop.listen(records).await;
        session.disconnect().await;
        let outcome = outcome?;

        result.position_count = outcome.records.len();
        result.raw_count = outcome.records.iter().filter(|r| r.is_raw()).count();
        if outcome.records.is_empty() {
            let waited = outcome.elapsed.as_secs();
            return Err(BacktestError::NoData(waited));
        }
        if result.raw_count > 0 {
            tracing::warn!(
                raw = result.raw_count,
                records = result.position_count,
                "Some frames could not be decoded; they are kept as hex and skipped by the ledger."
            );
        }
        if outcome.exit == ListenExit::Deadline {
            tracing::warn!(
                records = outcome.records.len(),
                "Listen budget ran out; results may be incomplete."
            );
        }

        // --- 4. Persist and analyse ---
        let stem = output_stem(&strategy.name, Utc::now());
        let file_path =
            write_records(&self.config.output.directory, &stem, &outcome.records).await?;
        result.file_path = file_path.display().to_string();

        let snapshots =
            snapshots_from_records(outcome.records.iter().filter_map(IngestRecord::json));
        let policy = ReconciliationPolicy::new(self.config.reconciliation.tolerance);
        let ledger = LedgerEngine::new(policy).reconstruct(&snapshots);
        let metrics =
            AnalyticsEngine::new().compute_metrics(&value_series(&snapshots), &ledger)?;

        let resolution = &self.config.simulation.resolution;
        let klines = match self.api.fetch_klines(&primary, from, to, resolution).await {
            Ok(klines) => Some(klines),
            Err(e) => {
                tracing::warn!(
                    instrument = %primary,
                    error = %e,
                    "Price history unavailable; chart has no overlay."
                );
                None
            }
        };
        let chart = assemble(&snapshots, &ledger, klines.as_deref());

        match self.renderer.render(&chart, &metrics, &stem) {
            Ok(path) => result.chart_path = path.display().to_string(),
            Err(e) => tracing::warn!(error = %e, "Chart rendering failed."),
        }

        tracing::info!(
            strategy = %strategy.name,
            snapshots = snapshots.len(),
            total_return = %metrics.total_return,
            trades = metrics.trade_count,
            "Backtest complete."
        );
        result.metrics = Some(metrics);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::error::ApiError;
    use api_client::{ConnectionCredentials, StrategyDetail, StrategyGroup};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use core_types::{Instrument, InstrumentInfo, Kline};
    use events::{RawFormat, RecordBody};
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const DAY: i64 = 86_400_000;
    const T0: i64 = 1_704_038_400_000;

    struct FakeBroker {
        strategy: Option<StrategyDetail>,
        reject_submission: bool,
        submitted: Mutex<Option<Value>>,
    }

    impl FakeBroker {
        fn with_strategy() -> Self {
            Self {
                strategy: Some(StrategyDetail {
                    id: Some("7".into()),
                    name: Some("breakout".into()),
                    indicator: Some("atr(14)".into()),
                    timing: Some("close > high(20)".into()),
                    control_risk: Some("stop = 0.05".into()),
                    choose_stock: Some(
                        "def choose_stock(context):\n    \
                         context.symbol_list = [\"000001.SZSE\"]\n"
                            .into(),
                    ),
                }),
                reject_submission: false,
                submitted: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl UpstreamApi for FakeBroker {
        async fn fetch_strategy(
            &self,
            _: &str,
            _: StrategyGroup,
        ) -> Result<StrategyDetail, ApiError> {
            self.strategy.clone().ok_or(ApiError::Upstream {
                code: 0,
                msg: "no such strategy".into(),
            })
        }

        async fn submit_backtest(&self, payload: &Value) -> Result<String, ApiError> {
            if self.reject_submission {
                return Err(ApiError::Upstream {
                    code: 0,
                    msg: "quota exceeded".into(),
                });
            }
            *self.submitted.lock().unwrap() = Some(payload.clone());
            Ok("session-token".into())
        }

        async fn issue_credentials(&self) -> Result<ConnectionCredentials, ApiError> {
            Ok(ConnectionCredentials {
                instance_id: "i-1".into(),
                client_id: "c-1".into(),
                trader_id: "t-1".into(),
                username: "user".into(),
                password: "pass".into(),
            })
        }

        async fn fetch_instrument(&self, id: &str) -> Result<InstrumentInfo, ApiError> {
            Ok(InstrumentInfo {
                instrument_id: id.to_string(),
                name: None,
                listing_date: NaiveDate::from_ymd_opt(2000, 1, 4),
                last_trade_date: None,
            })
        }

        async fn fetch_klines(
            &self,
            _: &Instrument,
            _: NaiveDate,
            _: NaiveDate,
            _: &str,
        ) -> Result<Vec<Kline>, ApiError> {
            Err(ApiError::InvalidData("no bars".into()))
        }
    }

    #[derive(Clone, Default)]
    struct FakeSession {
        connects: Arc<AtomicUsize>,
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl IngestSession for FakeSession {
        async fn connect(&mut self, _: &ConnectionCredentials) -> Result<(), ApiError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&mut self) -> bool {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn snapshot(timestamp: i64, total: i64, cash: i64, size: i64, price: i64) -> IngestRecord {
        IngestRecord::new(
            Utc::now(),
            RecordBody::Decoded(json!({
                "timestamp": timestamp,
                "totalValue": total,
                "positions": [
                    {"category": 0, "value": cash},
                    {
                        "category": 1,
                        "symbol": "000001",
                        "exchange": "SZSE",
                        "size": size,
                        "price": price
                    }
                ]
            })),
        )
    }

    /// A channel pre-filled with `records` whose sender is already gone.
    fn finished_stream(records: Vec<IngestRecord>) -> mpsc::Receiver<IngestRecord> {
        let (tx, rx) = mpsc::channel(records.len().max(1));
        for record in records {
            tx.try_send(record).unwrap();
        }
        rx
    }

    fn request() -> BacktestRequest {
        BacktestRequest {
            strategy_id: "7".into(),
            from: Some("2024-01-01".into()),
            to: Some("2024-03-01".into()),
            ..Default::default()
        }
    }

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.output.directory = dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn full_run_reconstructs_trades_and_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let broker = FakeBroker::with_strategy();
        let session = FakeSession::default();
        // Delivered out of order; the ledger sorts by timestamp.
        let records = finished_stream(vec![
            snapshot(T0 + 2 * DAY, 101_000, 101_000, 0, 12),
            snapshot(T0, 100_000, 100_000, 0, 10),
            snapshot(T0 + DAY, 100_000, 89_000, 1000, 11),
        ]);

        let result = BacktestRunner::new(&broker, &config)
            .run_with(&request(), session.clone(), records)
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.strategy_name, "breakout");
        assert_eq!(result.position_count, 3);
        assert_eq!(result.raw_count, 0);
        assert!(std::path::Path::new(&result.file_path).exists());
        assert!(std::path::Path::new(&result.chart_path).exists());
        assert_eq!(session.disconnects.load(Ordering::SeqCst), 1);

        let dates = result.date_validation.unwrap();
        assert_eq!(dates.adjusted_from, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(!dates.from_adjusted);

        let metrics = result.metrics.unwrap();
        assert_eq!(metrics.total_return, dec!(1));
        assert_eq!(metrics.trade_count, 1);
        assert_eq!(metrics.win_rate, dec!(100));
        assert_eq!(metrics.avg_trade, dec!(1000));

        let submitted = broker.submitted.lock().unwrap().clone().unwrap();
        assert_eq!(submitted["startDate"], "2024-01-01");
        assert_eq!(submitted["clientId"], "c-1");
    }

    #[tokio::test]
    async fn unknown_strategy_fails_without_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let broker = FakeBroker {
            strategy: None,
            ..FakeBroker::with_strategy()
        };
        let session = FakeSession::default();

        let result = BacktestRunner::new(&broker, &config)
            .run_with(&request(), session.clone(), finished_stream(Vec::new()))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found"));
        assert_eq!(session.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_submission_disconnects_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let broker = FakeBroker {
            reject_submission: true,
            ..FakeBroker::with_strategy()
        };
        let session = FakeSession::default();

        let result = BacktestRunner::new(&broker, &config)
            .run_with(&request(), session.clone(), finished_stream(Vec::new()))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Backtest submission failed"));
        assert_eq!(session.disconnects.load(Ordering::SeqCst), 1);
        assert!(result.date_validation.is_some());
    }

    #[tokio::test]
    async fn empty_stream_is_a_failed_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let broker = FakeBroker::with_strategy();

        let result = BacktestRunner::new(&broker, &config)
            .run_with(&request(), FakeSession::default(), finished_stream(Vec::new()))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("No position data"));
    }

    #[tokio::test]
    async fn undecodable_frames_are_counted_and_skipped_by_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let broker = FakeBroker::with_strategy();
        let raw = IngestRecord::new(
            Utc::now(),
            RecordBody::Raw {
                hex: "ff00".into(),
                format: RawFormat::Hex,
            },
        );
        let records = finished_stream(vec![
            snapshot(T0, 100_000, 100_000, 0, 10),
            raw,
            snapshot(T0 + DAY, 100_000, 89_000, 1000, 11),
        ]);

        let result = BacktestRunner::new(&broker, &config)
            .run_with(&request(), FakeSession::default(), records)
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.position_count, 3);
        assert_eq!(result.raw_count, 1);
        assert_eq!(result.metrics.unwrap().trade_count, 0);
    }
}
