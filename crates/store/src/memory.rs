use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    Category, CategoryId, Order, OrderDraft, OrderId, OrderStatus, PaymentStatus, Product,
    ProductId, UserId,
};
use tokio::sync::Mutex;

use crate::{
    Result, StoreError,
    store::{PaymentClaim, Store, plan_placement},
};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    categories: BTreeMap<CategoryId, Category>,
    orders: HashMap<OrderId, Order>,
}

/// In-memory store implementation for tests and local runs.
///
/// All state sits behind one mutex that is held for the whole of a placement
/// or release, so concurrent transactions are fully serialized.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Overrides an order's `updated_at`, for exercising time-based sweeps.
    pub async fn set_order_updated_at(&self, order_id: OrderId, at: DateTime<Utc>) {
        if let Some(order) = self.state.lock().await.orders.get_mut(&order_id) {
            order.updated_at = at;
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_product(&self, mut product: Product) -> Result<()> {
        product.set_stock(product.stock);
        self.state
            .lock()
            .await
            .products
            .insert(product.id.clone(), product);
        Ok(())
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(product_id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let state = self.state.lock().await;
        let mut products: Vec<_> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(products)
    }

    async fn upsert_category(&self, category: Category) -> Result<()> {
        self.state
            .lock()
            .await
            .categories
            .insert(category.id.clone(), category);
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self
            .state
            .lock()
            .await
            .categories
            .values()
            .cloned()
            .collect())
    }

    async fn place_order(&self, draft: OrderDraft) -> Result<Order> {
        let mut state = self.state.lock().await;

        // Nothing is mutated until the plan succeeds.
        let placement = plan_placement(&draft, &state.products)?;

        for (product_id, qty) in &placement.decrements {
            if let Some(product) = state.products.get_mut(product_id) {
                let remaining = product.stock - qty;
                product.set_stock(remaining);
            }
        }

        let now = Utc::now();
        let order = Order {
            id: OrderId::new(),
            user_id: draft.user_id,
            items: placement.items,
            totals: placement.totals,
            payment_method: draft.payment_method,
            shipping_address: draft.shipping_address,
            billing_address: draft.billing_address,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_reference: None,
            payment_receipt: None,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(order.id, order.clone());

        Ok(order)
    }

    async fn release_order(&self, order_id: OrderId) -> Result<Order> {
        let mut state = self.state.lock().await;

        let order = state
            .orders
            .get(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        if !order.status.can_cancel() {
            return Err(StoreError::InvalidStatus {
                order_id,
                status: order.status,
                action: "cancel",
            });
        }
        let items = order.items.clone();

        for item in &items {
            if let Some(product) = state.products.get_mut(&item.product_id) {
                let restored = product.stock.saturating_add(item.quantity);
                product.set_stock(restored);
            }
        }

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();

        Ok(order.clone())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn claim_payment(&self, order_id: OrderId) -> Result<PaymentClaim> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if order.status == OrderStatus::Cancelled {
            return Err(StoreError::InvalidStatus {
                order_id,
                status: order.status,
                action: "initiate payment",
            });
        }
        if !order.payment_status.can_initiate() {
            return Err(StoreError::PaymentConflict {
                order_id,
                payment_status: order.payment_status,
            });
        }

        let previous = order.payment_status;
        order.payment_status = PaymentStatus::Initiated;
        order.payment_reference = None;
        order.updated_at = Utc::now();
        Ok(PaymentClaim {
            order: order.clone(),
            previous,
        })
    }

    async fn attach_payment_reference(&self, order_id: OrderId, reference: &str) -> Result<Order> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if !order.payment_status.is_awaiting_result() || order.payment_reference.is_some() {
            return Err(StoreError::PaymentConflict {
                order_id,
                payment_status: order.payment_status,
            });
        }

        order.payment_reference = Some(reference.to_string());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn transition_payment(
        &self,
        order_id: OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        receipt: Option<String>,
    ) -> Result<Option<Order>> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if order.payment_status != expected {
            return Ok(None);
        }

        order.payment_status = next;
        if receipt.is_some() {
            order.payment_receipt = receipt;
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn list_initiated_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.payment_status.is_awaiting_result() && o.updated_at < cutoff)
            .cloned()
            .collect())
    }
}
