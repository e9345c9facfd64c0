use crate::error::ApiError;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

/// Header carrying the broker account the token was issued for.
const USER_ID_HEADER: &str = "X-User-Id";

/// The caller's authenticated session with the broker.
///
/// Passed explicitly into every client; nothing in this crate reads
/// credentials from global state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
}

impl Session {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
        }
    }

    pub fn from_config(config: &configuration::UpstreamConfig) -> Self {
        Self::new(config.token.clone(), config.user_id.clone())
    }
}

/// Builds the default headers attached to every broker API request.
///
/// Empty fields are omitted, so an anonymous session only sends public requests.
pub fn session_headers(session: &Session) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    if !session.token.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {}", session.token)).map_err(|e| {
            ApiError::InvalidData(format!("session token is not a valid header: {e}"))
        })?;
        headers.insert(AUTHORIZATION, value);
    }
    if !session.user_id.is_empty() {
        let value = HeaderValue::from_str(&session.user_id)
            .map_err(|e| ApiError::InvalidData(format!("user id is not a valid header: {e}")))?;
        headers.insert(USER_ID_HEADER, value);
    }
    Ok(headers)
}
