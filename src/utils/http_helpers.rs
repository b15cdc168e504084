use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// The JSON body every user-visible failure carries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub message: String,
}

/// A general purpose HTTP error type that can be converted into an `IntoResponse`.
#[derive(Debug)]
pub struct HTTPError {
    status: StatusCode,
    message: String,
}

impl HTTPError {
    /// Creates a new HTTP error with the given status code and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        HTTPError {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Converts our `HTTPError` into a `{"message": ...}` JSON response.
impl IntoResponse for HTTPError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            message: self.message,
        };
        // Serializing a single string field cannot fail.
        let json = serde_json::to_vec(&body).unwrap_or_default();
        let mut response = (self.status, json).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

/// Every failure the services surface, one HTTP status each.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    AuthTransport(String),
    #[error("{0}")]
    ProxyTransport(String),
    #[error("{0}")]
    AuthDenied(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Request timeout")]
    Timeout,
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::AuthTransport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::ProxyTransport(_) => StatusCode::BAD_GATEWAY,
            ServiceError::AuthDenied(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HTTPError {
    fn from(err: ServiceError) -> Self {
        HTTPError::new(err.status(), err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        HTTPError::from(self).into_response()
    }
}

/// Store failures seen from a handler. Backend details stay in the logs.
impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound("Not Found".to_string()),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Backend(msg) => {
                error!("Store error: {}", msg);
                ServiceError::Internal("Something went wrong".to_string())
            }
        }
    }
}
