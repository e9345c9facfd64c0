use crate::error::BacktestError;
use analytics::{ChartData, PerformanceMetrics};
use chrono::{DateTime, Utc};
use core_types::time::market_offset;
use events::IngestRecord;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Consumes assembled chart data and metrics, producing an artifact on disk.
pub trait ChartRenderer: Send + Sync {
    /// Renders one run and returns the artifact path.
    fn render(
        &self,
        chart: &ChartData,
        metrics: &PerformanceMetrics,
        stem: &str,
    ) -> Result<PathBuf, BacktestError>;
}

/// Writes the chart data and metrics as a pretty JSON document for an
/// external plotting tool.
#[derive(Debug, Clone)]
pub struct JsonChartRenderer {
    directory: PathBuf,
}

#[derive(Serialize)]
struct ChartDocument<'a> {
    metrics: &'a PerformanceMetrics,
    chart: &'a ChartData,
}

impl JsonChartRenderer {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl ChartRenderer for JsonChartRenderer {
    fn render(
        &self,
        chart: &ChartData,
        metrics: &PerformanceMetrics,
        stem: &str,
    ) -> Result<PathBuf, BacktestError> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(format!("{stem}_chart.json"));
        let document = ChartDocument { metrics, chart };
        std::fs::write(&path, serde_json::to_vec_pretty(&document)?)?;
        Ok(path)
    }
}

/// `<strategy>_<YYYYMMDD_HHMMSS>` in the market calendar, with anything but
/// alphanumerics, `-` and `_` in the name replaced by `_`.
pub fn output_stem(strategy_name: &str, at: DateTime<Utc>) -> String {
    let name: String = strategy_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let name = if name.is_empty() { "strategy".to_string() } else { name };
    let stamp = at.with_timezone(&market_offset()).format("%Y%m%d_%H%M%S");
    format!("{name}_{stamp}")
}

/// Dumps every received record, raw fallbacks included, as a JSON array.
pub async fn write_records(
    directory: &Path,
    stem: &str,
    records: &[IngestRecord],
) -> Result<PathBuf, BacktestError> {
    tokio::fs::create_dir_all(directory).await?;
    let path = directory.join(format!("{stem}_records.json"));
    let dump: Vec<Value> = records.iter().map(IngestRecord::to_json).collect();
    tokio::fs::write(&path, serde_json::to_vec_pretty(&dump)?).await?;
    tracing::info!(path = %path.display(), records = records.len(), "Records written.");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use events::{RawFormat, RecordBody};
    use serde_json::json;

    #[test]
    fn stem_is_filesystem_safe_and_uses_market_time() {
        let at = Utc.with_ymd_and_hms(2024, 5, 28, 16, 30, 0).unwrap();
        assert_eq!(output_stem("dual ma/v2", at), "dual_ma_v2_20240529_003000");
        assert_eq!(output_stem("", at), "strategy_20240529_003000");
    }

    #[tokio::test]
    async fn records_and_chart_land_in_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            IngestRecord::new(
                Utc::now(),
                RecordBody::Decoded(json!({"timestamp": 1, "positions": []})),
            ),
            IngestRecord::new(
                Utc::now(),
                RecordBody::Raw {
                    hex: "ff00".to_string(),
                    format: RawFormat::Hex,
                },
            ),
        ];

        let path = write_records(dir.path(), "run", &records).await.unwrap();
        let dumped: Vec<Value> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(dumped.len(), 2);
        assert_eq!(dumped[1]["hex"], "ff00");

        let renderer = JsonChartRenderer::new(dir.path());
        let chart_path = renderer
            .render(&ChartData::default(), &PerformanceMetrics::default(), "run")
            .unwrap();
        assert!(chart_path.ends_with("run_chart.json"));
        let document: Value = serde_json::from_slice(&std::fs::read(&chart_path).unwrap()).unwrap();
        assert_eq!(document["metrics"]["tradeCount"], 0);
    }
}
