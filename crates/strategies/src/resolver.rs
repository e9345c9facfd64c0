use crate::choose_stock::{extract_instruments, find_benchmark, normalize};
use crate::error::StrategyError;
use api_client::error::ApiError;
use api_client::{StrategyDetail, StrategyGroup, UpstreamApi};
use core_types::Instrument;
use serde::{Deserialize, Serialize};

/// Caller-supplied replacements for a stored strategy's code fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOverrides {
    pub indicator: Option<String>,
    pub timing: Option<String>,
    pub control_risk: Option<String>,
    /// Either a complete selection function or a bare `SYM.EXCH&SYM.EXCH` list.
    pub choose_stock: Option<String>,
}

/// A stored strategy merged with the caller's overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStrategyPayload {
    pub id: String,
    pub name: String,
    pub indicator: String,
    pub timing: String,
    pub control_risk: String,
    pub choose_stock: String,
    /// Non-empty when produced by `merge`.
    pub instruments: Vec<Instrument>,
    /// Required whenever more than one instrument is traded.
    pub benchmark: Option<Instrument>,
}

impl ResolvedStrategyPayload {
    /// The instrument used for date bounds and the price overlay.
    pub fn primary_instrument(&self) -> Option<&Instrument> {
        self.instruments.first()
    }
}

/// Applies `overrides` field by field on top of `stored`, then derives the
/// instrument list and benchmark.
pub fn merge(
    strategy_id: &str,
    stored: StrategyDetail,
    overrides: &StrategyOverrides,
) -> Result<ResolvedStrategyPayload, StrategyError> {
    let choose_stock = match &overrides.choose_stock {
        Some(code) if !code.trim().is_empty() => normalize(code),
        _ => stored.choose_stock.clone().filter(|c| !c.trim().is_empty()).ok_or_else(|| {
            StrategyError::MalformedStrategy(format!("strategy {strategy_id} has no chooseStock"))
        })?,
    };

    let pick = |over: &Option<String>, base: Option<String>| {
        over.clone().or(base).unwrap_or_default()
    };
    let indicator = pick(&overrides.indicator, stored.indicator);
    let timing = pick(&overrides.timing, stored.timing);
    let control_risk = pick(&overrides.control_risk, stored.control_risk);

    let instruments = extract_instruments(&choose_stock)?;
    let benchmark = find_benchmark(&[&control_risk, &timing])?;
    if instruments.len() > 1 && benchmark.is_none() {
        return Err(StrategyError::MissingBenchmark(instruments.len()));
    }

    let name = stored
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| strategy_id.to_string());

    Ok(ResolvedStrategyPayload {
        id: strategy_id.to_string(),
        name,
        indicator,
        timing,
        control_risk,
        choose_stock,
        instruments,
        benchmark,
    })
}

/// Errors that mean the strategy lives elsewhere, not that the broker is unreachable.
fn missing_from_group(error: &ApiError) -> bool {
    matches!(
        error,
        ApiError::Upstream { .. } | ApiError::Http { .. } | ApiError::Deserialization(_)
    )
}

/// Loads stored strategies from the broker and merges caller overrides.
pub struct StrategyResolver<'a> {
    api: &'a dyn UpstreamApi,
}

impl<'a> StrategyResolver<'a> {
    pub fn new(api: &'a dyn UpstreamApi) -> Self {
        Self { api }
    }

    /// Looks the strategy up in the user group, then the library group.
    pub async fn fetch(&self, strategy_id: &str) -> Result<StrategyDetail, StrategyError> {
        for group in [StrategyGroup::User, StrategyGroup::Library] {
            match self.api.fetch_strategy(strategy_id, group).await {
                Ok(detail) => {
                    tracing::debug!(strategy_id, group = group.as_str(), "Loaded stored strategy.");
                    return Ok(detail);
                }
                Err(e) if missing_from_group(&e) => {
                    tracing::debug!(
                        strategy_id,
                        group = group.as_str(),
                        error = %e,
                        "Strategy not in group."
                    );
                }
                Err(e) => return Err(StrategyError::Api(e)),
            }
        }
        Err(StrategyError::NotFound(strategy_id.to_string()))
    }

    pub async fn resolve(
        &self,
        strategy_id: &str,
        overrides: &StrategyOverrides,
    ) -> Result<ResolvedStrategyPayload, StrategyError> {
        let stored = self.fetch(strategy_id).await?;
        let resolved = merge(strategy_id, stored, overrides)?;
        tracing::info!(
            strategy_id,
            name = %resolved.name,
            instruments = resolved.instruments.len(),
            "Strategy resolved."
        );
        Ok(resolved)
    }
}
