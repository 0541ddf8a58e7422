//! Order confirmation notifications.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{Address, Money, Order, OrderId, OrderItem};

use crate::error::NotifyError;

/// What the customer is told once an order is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    pub customer_name: String,
    pub total: Money,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
}

impl From<&Order> for OrderConfirmation {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_name: order.shipping_address.name.clone(),
            total: order.totals.total,
            items: order.items.clone(),
            shipping_address: order.shipping_address.clone(),
        }
    }
}

/// Delivers order confirmations to customers.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_placed(&self, confirmation: &OrderConfirmation) -> Result<(), NotifyError>;
}

/// Writes confirmations to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn order_placed(&self, confirmation: &OrderConfirmation) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %confirmation.order_id,
            customer = %confirmation.customer_name,
            total = %confirmation.total,
            items = confirmation.items.len(),
            city = %confirmation.shipping_address.city,
            "order confirmation"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<OrderConfirmation>,
    fail: bool,
}

/// Records confirmations for inspection in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).fail = fail;
    }

    pub fn sent(&self) -> Vec<OrderConfirmation> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn order_placed(&self, confirmation: &OrderConfirmation) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail {
            return Err(NotifyError("mailbox unavailable".to_string()));
        }
        state.sent.push(confirmation.clone());
        Ok(())
    }
}
