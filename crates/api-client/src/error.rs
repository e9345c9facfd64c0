use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to send the HTTP request: {0}")]
    RequestBuild(#[from] reqwest::Error),

    #[error("HTTP {status} from the broker API: {body}")]
    Http { status: u16, body: String },

    #[error("The broker API returned code {code}: {msg}")]
    Upstream { code: i64, msg: String },

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("Message bus error: {0}")]
    Mqtt(String),

    #[error("Message bus handshake timed out after {0}s")]
    ConnectTimeout(u64),
}
