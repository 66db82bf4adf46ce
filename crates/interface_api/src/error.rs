//! API error handling
//!
//! Every failure leaves the API as `{ "error": "<message>" }`. Storage
//! failures are logged in full and reach the client only as a generic
//! "Failed to ..." message.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use domain_billing::BillingError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BusinessRule(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    /// Maps a billing error raised while performing `operation`
    ///
    /// ```rust
    /// use domain_billing::BillingError;
    /// use interface_api::error::ApiError;
    ///
    /// let error = ApiError::failed("delete installment")(BillingError::business_rule("cannot delete down payment"));
    /// assert!(matches!(error, ApiError::BusinessRule(_)));
    /// ```
    pub fn failed(operation: &'static str) -> impl Fn(BillingError) -> ApiError {
        move |err| match err {
            BillingError::Validation(message) => ApiError::Validation(message),
            BillingError::BusinessRule(message) => ApiError::BusinessRule(message),
            err @ BillingError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            BillingError::Storage(source) => {
                error!(operation, error = %source, details = ?source, "Storage failure");
                ApiError::Internal(format!("Failed to {}", operation))
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BusinessRule(_) | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        ApiError::failed("process request")(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // Well-formed JSON that does not fit the request type
            JsonRejection::JsonDataError(err) => ApiError::Validation(err.body_text()),
            rejection => ApiError::BadRequest(rejection.body_text()),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<core_kernel::MoneyError> for ApiError {
    fn from(err: core_kernel::MoneyError) -> Self {
        ApiError::Validation(err.to_string())
    }
}
