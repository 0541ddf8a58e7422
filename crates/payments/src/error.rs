use common::Money;
use thiserror::Error;

/// Errors from payment initiation and callback handling.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("M-Pesa is not configured")]
    NotConfigured,

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Invalid payment amount: {0}")]
    InvalidAmount(Money),

    /// Any failure talking to the payment network: transport, timeout,
    /// non-success status, rejected request or undecodable body.
    #[error("Payment network error: {0}")]
    Network(String),

    #[error("Malformed payment callback: {0}")]
    MalformedCallback(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PaymentError::Network("request timed out".to_string())
        } else {
            PaymentError::Network(err.to_string())
        }
    }
}

/// A notification could not be delivered.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);
