//! Huawei provider error types

use canopy_cloud::{ApiError, CloudError};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HuaweiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Api(ApiError),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider configuration missing from the reconcile context")]
    MissingConfig,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type Result<T> = std::result::Result<T, HuaweiError>;

impl From<HuaweiError> for CloudError {
    fn from(err: HuaweiError) -> Self {
        match err {
            HuaweiError::Api(api) => CloudError::Api(api),
            // connection resets and timeouts are worth another attempt
            HuaweiError::Http(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                CloudError::Transport(e.to_string())
            }
            HuaweiError::Http(e) => match e.status() {
                Some(status) => CloudError::Api(ApiError::new(status.as_u16(), e.to_string())),
                None => CloudError::Transport(e.to_string()),
            },
            HuaweiError::Json(e) => CloudError::Json(e),
            HuaweiError::MissingConfig => CloudError::InvalidConfig(
                "provider configuration missing from the reconcile context".into(),
            ),
            HuaweiError::InvalidConfig(msg) => CloudError::InvalidConfig(msg),
            HuaweiError::UnexpectedResponse(msg) => CloudError::Internal(msg),
        }
    }
}

/// The two error body shapes the services answer with.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Flat {
        error_code: String,
        error_msg: String,
    },
    Nested {
        error: NestedError,
    },
}

#[derive(Debug, Deserialize)]
struct NestedError {
    code: String,
    message: String,
}

/// Build an [`ApiError`] from a failed response's status, body and request ID.
pub fn api_error(status: u16, body: &str, request_id: Option<String>) -> ApiError {
    let mut err = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Flat {
            error_code,
            error_msg,
        }) => ApiError::new(status, error_msg).with_code(error_code),
        Ok(ErrorBody::Nested { error }) => ApiError::new(status, error.message).with_code(error.code),
        Err(_) if body.trim().is_empty() => ApiError::new(status, "empty response body"),
        Err(_) => ApiError::new(status, body.trim()),
    };
    if let Some(id) = request_id {
        err = err.with_request_id(id);
    }
    err
}
