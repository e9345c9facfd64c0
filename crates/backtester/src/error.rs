use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Strategy resolution failed: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Upstream request failed: {0}")]
    Api(#[from] api_client::error::ApiError),

    #[error("Backtest submission failed: {0}")]
    Submission(api_client::error::ApiError),

    #[error("Analytics calculation error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("No position data received within {0} seconds.")]
    NoData(u64),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Chart rendering failed: {0}")]
    Render(String),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),
}

impl From<indicatif::style::TemplateError> for BacktestError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        BacktestError::ProgressBarTemplate(error.to_string())
    }
}
