//! Gateway errors.

use thiserror::Error;

/// Failures talking to the payment gateway.
///
/// Raw gateway bodies are kept for logging; the API layer never forwards
/// them to clients.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Transport failure, including the request timeout.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Non-2xx response.
    #[error("API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// 2xx response whose body did not match the expected shape.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Well-formed response declining the request (`ResponseCode != "0"`).
    #[error("Request rejected ({code}): {description}")]
    Rejected { code: String, description: String },
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::HttpError(format!("request timed out: {}", err))
        } else {
            GatewayError::HttpError(err.to_string())
        }
    }
}
