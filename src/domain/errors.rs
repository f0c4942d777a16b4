use reqwest::{StatusCode, Url};
use thiserror::Error;

/// Errors raised while talking to the key issuance API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Timeout while waiting for the key issuance API")]
    Timeout,

    #[error("HTTP error {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request parameters: {0}")]
    InvalidParams(String),
}

impl ApiError {
    /// Non-success answer from `url`. The query is left out since it may carry an API key.
    pub fn status(status: StatusCode, url: &Url) -> Self {
        ApiError::Status {
            status,
            url: redacted(url),
        }
    }
}

/// `url` without its query string, safe to log.
pub fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

/// Convenient Result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised by the issuing side.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IssuerError {
    #[error("Unknown payment request: {0}")]
    UnknownPayment(String),

    #[error("Unknown API key")]
    UnknownKey,

    #[error("Validity must be between 1 and 36500 days")]
    InvalidDays,
}
