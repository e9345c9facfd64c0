use crate::error::BacktestError;
use api_client::{ConnectionCredentials, UpstreamApi};
use chrono::NaiveDate;
use configuration::{SettlementMode, Simulation};
use core_types::time::{day_end_millis, day_start_millis};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use strategies::ResolvedStrategyPayload;

/// The upstream job-submission schema.
///
/// `start_date`/`end_date` and `range` describe the same period; the broker
/// reads the dates for display and the millisecond bounds for the run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload<'a> {
    pub strategy_id: &'a str,
    pub name: &'a str,
    pub indicator: &'a str,
    pub timing: &'a str,
    pub control_risk: &'a str,
    pub choose_stock: &'a str,
    pub symbols: Vec<String>,
    pub benchmark: Option<String>,

    pub capital: Decimal,
    pub order_size: Decimal,
    pub margin: Decimal,
    pub commission: Decimal,
    pub risk_free_rate: Decimal,
    pub pyramiding: u32,
    pub resolution: &'a str,
    pub settlement: SettlementMode,

    pub start_date: String,
    pub end_date: String,
    pub range: [i64; 2],

    pub instance_id: &'a str,
    pub client_id: &'a str,
    pub trader_id: &'a str,
}

impl<'a> SubmissionPayload<'a> {
    pub fn new(
        strategy: &'a ResolvedStrategyPayload,
        simulation: &'a Simulation,
        from: NaiveDate,
        to: NaiveDate,
        credentials: &'a ConnectionCredentials,
    ) -> Self {
        Self {
            strategy_id: &strategy.id,
            name: &strategy.name,
            indicator: &strategy.indicator,
            timing: &strategy.timing,
            control_risk: &strategy.control_risk,
            choose_stock: &strategy.choose_stock,
            symbols: strategy.instruments.iter().map(ToString::to_string).collect(),
            benchmark: strategy.benchmark.as_ref().map(ToString::to_string),
            capital: simulation.capital,
            order_size: simulation.order_size,
            margin: simulation.margin,
            commission: simulation.commission,
            risk_free_rate: simulation.risk_free_rate,
            pyramiding: simulation.pyramiding,
            resolution: &simulation.resolution,
            settlement: simulation.settlement,
            start_date: from.format("%Y-%m-%d").to_string(),
            end_date: to.format("%Y-%m-%d").to_string(),
            range: [day_start_millis(from), day_end_millis(to)],
            instance_id: &credentials.instance_id,
            client_id: &credentials.client_id,
            trader_id: &credentials.trader_id,
        }
    }
}

/// Submits backtest jobs and returns the broker's session token.
pub struct JobSubmitter<'a> {
    api: &'a dyn UpstreamApi,
    simulation: &'a Simulation,
}

impl<'a> JobSubmitter<'a> {
    pub fn new(api: &'a dyn UpstreamApi, simulation: &'a Simulation) -> Self {
        Self { api, simulation }
    }

    pub async fn submit(
        &self,
        strategy: &ResolvedStrategyPayload,
        from: NaiveDate,
        to: NaiveDate,
        credentials: &ConnectionCredentials,
    ) -> Result<String, BacktestError> {
        let payload = SubmissionPayload::new(strategy, self.simulation, from, to, credentials);
        let body: Value = serde_json::to_value(&payload)?;

        let token = self
            .api
            .submit_backtest(&body)
            .await
            .map_err(BacktestError::Submission)?;
        tracing::info!(strategy_id = %strategy.id, %from, %to, "Backtest job submitted.");
        Ok(token)
    }
}
