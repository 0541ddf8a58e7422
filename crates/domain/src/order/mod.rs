//! Order placement workflow.

mod request;
mod service;
mod validation;

pub use request::{AddressRequest, CartItemRequest, PlaceOrderRequest};
pub use service::{OrderService, PaymentOutcome};
pub use validation::{FieldError, MAX_LINE_QUANTITY, ValidatedOrder, is_valid_phone, validate};

use common::{Money, OrderId, OrderStatus, PaymentStatus, ProductId, StockShortage};
use thiserror::Error;

/// Errors surfaced by the order workflow.
///
/// Every variant except `Unexpected` is detected before anything is written
/// and carries enough detail for the caller to correct and retry.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The payload failed structural validation.
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// The caller is not authenticated.
    #[error("Authentication required")]
    Unauthorized,

    /// The order belongs to another user.
    #[error("Order {0} does not belong to the caller")]
    Forbidden(OrderId),

    /// A cart line referenced a product that no longer exists.
    #[error("Product not found: {product_id}")]
    NotFound { product_id: ProductId },

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Stock did not cover one or more lines. Listed in submission order.
    #[error("Insufficient stock for {}", .0.first().map(|s| s.product_name.as_str()).unwrap_or("unknown product"))]
    InsufficientStock(Vec<StockShortage>),

    /// The client-computed total does not match current prices.
    #[error("Order total {client} does not match current prices ({server})")]
    TotalMismatch { client: Money, server: Money },

    /// The order's status does not allow the requested change.
    #[error("Order is {status}, cannot {action}")]
    InvalidStatus {
        status: OrderStatus,
        action: &'static str,
    },

    /// A payment is already in flight or settled for this order.
    #[error("Order payment is {0}, cannot initiate payment")]
    PaymentConflict(PaymentStatus),

    /// Anything else. Details are logged, never returned to the caller.
    #[error("Unexpected error")]
    Unexpected,
}

impl OrderError {
    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation",
            OrderError::Unauthorized => "unauthorized",
            OrderError::Forbidden(_) => "forbidden",
            OrderError::NotFound { .. } => "product_not_found",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::InsufficientStock(_) => "insufficient_stock",
            OrderError::TotalMismatch { .. } => "total_mismatch",
            OrderError::InvalidStatus { .. } => "invalid_status",
            OrderError::PaymentConflict(_) => "payment_conflict",
            OrderError::Unexpected => "unexpected",
        }
    }
}

impl From<store::StoreError> for OrderError {
    fn from(err: store::StoreError) -> Self {
        use store::StoreError;

        match err {
            StoreError::ProductNotFound(product_id) => OrderError::NotFound { product_id },
            StoreError::InsufficientStock(shortages) => OrderError::InsufficientStock(shortages),
            StoreError::TotalMismatch { client, server } => {
                OrderError::TotalMismatch { client, server }
            }
            StoreError::OrderNotFound(order_id) => OrderError::OrderNotFound(order_id),
            StoreError::InvalidStatus { status, action, .. } => {
                OrderError::InvalidStatus { status, action }
            }
            StoreError::PaymentConflict { payment_status, .. } => {
                OrderError::PaymentConflict(payment_status)
            }
            other => {
                tracing::error!(error = %other, "store operation failed");
                OrderError::Unexpected
            }
        }
    }
}
