//! HTTP error body and the mapping from domain errors onto it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use checkout_core::CheckoutError;
use serde::Serialize;
use tracing::{error, warn};

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Every validation problem, when there were several
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
            errors: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }
}

/// Handler error: a domain error rendered as an [`ErrorResponse`]
#[derive(Debug)]
pub struct ApiError(pub CheckoutError);

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(CheckoutError::InvalidRequest(message.into()))
    }

    fn body(&self) -> ErrorResponse {
        let err = &self.0;
        let response = ErrorResponse::new(err.user_message(), err.status_code());
        match err {
            CheckoutError::Validation { errors } => response.with_errors(errors.clone()),
            CheckoutError::PaymentDeclined { reason } => response.with_details(reason.clone()),
            _ => response,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.body();
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(status = body.code, retryable = self.0.is_retryable(), "Request failed: {}", self.0);
        } else {
            warn!(status = body.code, "Request rejected: {}", self.0);
        }

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_carries_every_error() {
        let err = ApiError(CheckoutError::Validation {
            errors: vec!["Cart is empty".into(), "Invalid email".into()],
        });
        let body = err.body();
        assert_eq!(body.code, 422);
        assert_eq!(body.errors.len(), 2);
    }

    #[test]
    fn test_decline_hides_reason_in_details() {
        let err = ApiError(CheckoutError::PaymentDeclined {
            reason: "Your card was declined.".into(),
        });
        let body = err.body();
        assert_eq!(body.code, 402);
        assert_eq!(body.error, "Your payment could not be processed");
        assert_eq!(body.details.as_deref(), Some("Your card was declined."));
    }

    #[test]
    fn test_persistence_failure_references_transaction() {
        let err = ApiError(CheckoutError::PersistenceFailed {
            transaction_id: "pi_123".into(),
            message: "disk full".into(),
        });
        let body = err.body();
        assert_eq!(body.code, 500);
        assert!(body.error.ends_with("reference pi_123"));
        assert!(body.details.is_none());
    }
}
