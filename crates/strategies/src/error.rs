use api_client::error::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Strategy '{0}' was not found in the user or library group")]
    NotFound(String),

    #[error("Could not extract instruments from chooseStock: {0}")]
    Extraction(String),

    #[error("Strategy trades {0} instruments but sets no benchmark in controlRisk or timing")]
    MissingBenchmark(usize),

    #[error("Strategy definition is malformed: {0}")]
    MalformedStrategy(String),

    #[error("Broker API error while loading the strategy: {0}")]
    Api(#[from] ApiError),
}
