//! HTTP route handlers.

pub mod orders;
pub mod payments;
pub mod products;
pub mod system;

use std::sync::Arc;

use common::OrderId;
use domain::OrderService;
use ::payments::{Notifier, PaymentGateway};
use store::Store;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub orders: OrderService<S>,
    pub payments: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}
