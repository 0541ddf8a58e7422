use common::{Money, OrderId, OrderStatus, PaymentStatus, ProductId, StockShortage};
use thiserror::Error;

/// Errors that can occur when reading or writing the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An order line referenced a product that does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// One or more lines asked for more than the available stock.
    ///
    /// Shortages are listed in the order the lines were submitted.
    #[error("Insufficient stock for {}", first_shortage_name(.0))]
    InsufficientStock(Vec<StockShortage>),

    /// The client's grand total diverged from the recomputed one.
    #[error("Order total mismatch: client {client}, server {server}")]
    TotalMismatch { client: Money, server: Money },

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order is not in a status that allows the requested change.
    #[error("Order {order_id} is {status}, cannot {action}")]
    InvalidStatus {
        order_id: OrderId,
        status: OrderStatus,
        action: &'static str,
    },

    /// A payment prompt was requested while another is in flight or settled.
    #[error("Order {order_id} payment is {payment_status}, cannot initiate payment")]
    PaymentConflict {
        order_id: OrderId,
        payment_status: PaymentStatus,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be mapped back into a domain type.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

fn first_shortage_name(shortages: &[StockShortage]) -> &str {
    shortages
        .first()
        .map(|s| s.product_name.as_str())
        .unwrap_or("unknown product")
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
