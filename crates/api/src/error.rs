//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use payments::PaymentError;
use serde::Serialize;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Resource not found.
    NotFound(String),
    /// The caller did not identify themselves.
    Unauthorized,
    /// Order workflow error.
    Order(OrderError),
    /// Payment initiation or callback error.
    Payment(PaymentError),
    /// Internal server error. The message is logged, not returned.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

const INTERNAL_MESSAGE: &str = "Internal server error";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
                None,
            ),
            ApiError::Order(err) => order_error_to_response(err),
            ApiError::Payment(err) => payment_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_MESSAGE.to_string(),
                    None,
                )
            }
        };

        (status, axum::Json(ErrorBody { error, details })).into_response()
    }
}

fn order_error_to_response(err: OrderError) -> (StatusCode, String, Option<serde_json::Value>) {
    let message = err.to_string();
    match err {
        OrderError::Validation(errors) => (
            StatusCode::BAD_REQUEST,
            message,
            serde_json::to_value(errors).ok(),
        ),
        OrderError::Unauthorized => (StatusCode::UNAUTHORIZED, message, None),
        OrderError::Forbidden(_) => (StatusCode::FORBIDDEN, message, None),
        OrderError::NotFound { .. } | OrderError::OrderNotFound(_) => {
            (StatusCode::NOT_FOUND, message, None)
        }
        OrderError::InsufficientStock(shortages) => (
            StatusCode::CONFLICT,
            message,
            serde_json::to_value(shortages).ok(),
        ),
        OrderError::TotalMismatch { .. }
        | OrderError::InvalidStatus { .. }
        | OrderError::PaymentConflict(_) => (StatusCode::CONFLICT, message, None),
        OrderError::Unexpected => (
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_MESSAGE.to_string(),
            None,
        ),
    }
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, String, Option<serde_json::Value>) {
    match &err {
        PaymentError::NotConfigured => (StatusCode::SERVICE_UNAVAILABLE, err.to_string(), None),
        PaymentError::InvalidPhone(_) | PaymentError::InvalidAmount(_) => {
            (StatusCode::BAD_REQUEST, err.to_string(), None)
        }
        PaymentError::MalformedCallback(_) => (StatusCode::BAD_REQUEST, err.to_string(), None),
        PaymentError::Network(detail) => {
            tracing::warn!(error = %detail, "payment network failure");
            (
                StatusCode::BAD_GATEWAY,
                "Payment provider request failed".to_string(),
                None,
            )
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<store::StoreError> for ApiError {
    fn from(err: store::StoreError) -> Self {
        ApiError::Order(err.into())
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}
