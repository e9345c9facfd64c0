use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("An unexpected error occurred during analytics calculation: {0}")]
    InternalError(String),
}
