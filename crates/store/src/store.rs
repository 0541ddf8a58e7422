use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    Category, Money, Order, OrderDraft, OrderId, OrderItem, PaymentStatus, Product, ProductId,
    StockShortage, Totals, UserId,
};

use crate::{Result, StoreError};

/// Core trait for catalog and order persistence.
///
/// Operations that touch stock run as a single all-or-nothing unit: either
/// every stock change and every row is written, or nothing is.
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts or replaces a product, keeping `in_stock` in line with `stock`.
    async fn upsert_product(&self, product: Product) -> Result<()>;

    /// Retrieves a product by id.
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Lists all products ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Inserts or replaces a category.
    async fn upsert_category(&self, category: Category) -> Result<()>;

    /// Lists all categories ordered by id.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Places an order.
    ///
    /// Checks stock for every line, decrements it relatively, and persists
    /// the order with its item snapshots in one transaction. On any error
    /// nothing is written.
    async fn place_order(&self, draft: OrderDraft) -> Result<Order>;

    /// Cancels an order and returns its quantities to stock in one transaction.
    ///
    /// Fails with `InvalidStatus` unless the order is pending or processing.
    async fn release_order(&self, order_id: OrderId) -> Result<Order>;

    /// Retrieves an order by id.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists a user's orders, newest first.
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Claims the order for a new payment prompt before it is sent.
    ///
    /// Moves the payment status to `initiated` and clears any earlier
    /// reference in one step, so of two concurrent claims exactly one wins.
    /// Fails with `InvalidStatus` for cancelled orders and `PaymentConflict`
    /// unless the current payment status allows a new prompt.
    async fn claim_payment(&self, order_id: OrderId) -> Result<PaymentClaim>;

    /// Attaches the network's checkout reference to a claimed payment.
    ///
    /// Fails with `PaymentConflict` unless the order is `initiated` and has
    /// no reference yet.
    async fn attach_payment_reference(&self, order_id: OrderId, reference: &str) -> Result<Order>;

    /// Finds the order a payment reference was issued for.
    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>>;

    /// Moves the payment status from `expected` to `next`.
    ///
    /// Returns `None` without writing if the current status is not `expected`.
    async fn transition_payment(
        &self,
        order_id: OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        receipt: Option<String>,
    ) -> Result<Option<Order>>;

    /// Lists orders still awaiting a payment result that were last updated before `cutoff`.
    async fn list_initiated_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;
}

/// An order claimed for a payment prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentClaim {
    /// The order as written by the claim.
    pub order: Order,
    /// Payment status before the claim, restored if the prompt is never sent.
    pub previous: PaymentStatus,
}

/// Outcome of checking a draft against locked product rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Item snapshots in submission order.
    pub items: Vec<OrderItem>,
    /// Totals recomputed from catalog prices.
    pub totals: Totals,
    /// Per-product decrement, one entry per product in first-seen order.
    pub decrements: Vec<(ProductId, u32)>,
}

/// Checks a draft against the current product rows.
///
/// Lines are walked in submission order and the first failing line decides
/// the error. A missing product seen before any shortage aborts at once.
/// Quantities for a product that appears on several lines are summed, and
/// once a line runs short every shortage in the cart is reported, ordered
/// by the line that first exceeded stock. Totals are then recomputed from
/// catalog prices and compared with the client's.
pub fn plan_placement(
    draft: &OrderDraft,
    products: &HashMap<ProductId, Product>,
) -> Result<Placement> {
    let mut items = Vec::with_capacity(draft.items.len());
    let mut requested: Vec<(ProductId, u32)> = Vec::new();
    let mut shortages: Vec<StockShortage> = Vec::new();

    for line in &draft.items {
        let Some(product) = products.get(&line.product_id) else {
            if shortages.is_empty() {
                return Err(StoreError::ProductNotFound(line.product_id.clone()));
            }
            continue;
        };

        let total = match requested.iter_mut().find(|(id, _)| *id == product.id) {
            Some((_, qty)) => {
                *qty = qty.saturating_add(line.quantity);
                *qty
            }
            None => {
                requested.push((product.id.clone(), line.quantity));
                line.quantity
            }
        };

        if total > product.stock {
            match shortages.iter_mut().find(|s| s.product_id == product.id) {
                Some(shortage) => shortage.requested = total,
                None => shortages.push(StockShortage {
                    product_id: product.id.clone(),
                    product_name: product.name.clone(),
                    available: product.stock,
                    requested: total,
                }),
            }
        }

        items.push(OrderItem {
            product_id: product.id.clone(),
            quantity: line.quantity,
            unit_price: product.price,
            name: product.name.clone(),
            image: line.image.clone().or_else(|| product.image.clone()),
        });
    }

    if !shortages.is_empty() {
        return Err(StoreError::InsufficientStock(shortages));
    }

    let subtotal: Money = items.iter().map(OrderItem::line_total).sum();
    let totals = draft.pricing.quote(subtotal);
    if !draft.pricing.accepts(&draft.client_totals, &totals) {
        return Err(StoreError::TotalMismatch {
            client: draft.client_totals.total,
            server: totals.total,
        });
    }

    Ok(Placement {
        items,
        totals,
        decrements: requested,
    })
}
