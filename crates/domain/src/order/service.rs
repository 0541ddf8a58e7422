//! Order service wrapping the store's transactional operations.

use chrono::Utc;
use common::{Order, OrderDraft, OrderId, PaymentStatus, PricingPolicy, UserId};
use store::{PaymentClaim, Store};

use super::{OrderError, PlaceOrderRequest, validate};

/// Result of a payment attempt as reported by the payment network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    /// Checkout request id the prompt was issued under.
    pub reference: String,
    pub success: bool,
    pub receipt: Option<String>,
}

/// Service for placing and managing orders.
///
/// Stock consistency is delegated entirely to the store's transactions; the
/// service takes no locks of its own.
pub struct OrderService<S: Store> {
    store: S,
    pricing: PricingPolicy,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service with the default pricing policy.
    pub fn new(store: S) -> Self {
        Self::with_pricing(store, PricingPolicy::default())
    }

    pub fn with_pricing(store: S, pricing: PricingPolicy) -> Self {
        Self { store, pricing }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    /// Places an order for the caller.
    ///
    /// Authentication is checked first, then the payload is validated; only a
    /// valid payload reaches the store. On any error nothing is persisted.
    #[tracing::instrument(skip(self, req), fields(user_id))]
    pub async fn place_order(
        &self,
        user: Option<UserId>,
        req: &PlaceOrderRequest,
    ) -> Result<Order, OrderError> {
        let result = self.try_place_order(user, req).await;
        record_placement(&result);
        result
    }

    /// Places an order from a raw JSON payload.
    ///
    /// Fields of the wrong JSON type are reported as validation errors,
    /// after the authentication check.
    #[tracing::instrument(skip(self, payload), fields(user_id))]
    pub async fn place_order_from_json(
        &self,
        user: Option<UserId>,
        payload: &serde_json::Value,
    ) -> Result<Order, OrderError> {
        let result = match PlaceOrderRequest::from_value(payload) {
            Ok(req) => self.try_place_order(user, &req).await,
            Err(_) if user.is_none() => Err(OrderError::Unauthorized),
            Err(errors) => Err(OrderError::Validation(errors)),
        };
        record_placement(&result);
        result
    }

    async fn try_place_order(
        &self,
        user: Option<UserId>,
        req: &PlaceOrderRequest,
    ) -> Result<Order, OrderError> {
        let user_id = user.ok_or(OrderError::Unauthorized)?;
        tracing::Span::current().record("user_id", tracing::field::display(user_id));

        let validated = validate(req).map_err(OrderError::Validation)?;

        let draft = OrderDraft {
            user_id,
            items: validated.items,
            client_totals: validated.client_totals,
            pricing: self.pricing,
            payment_method: validated.payment_method,
            shipping_address: validated.shipping_address,
            billing_address: validated.billing_address,
        };

        Ok(self.store.place_order(draft).await?)
    }

    /// Loads one of the caller's orders.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, user: UserId, order_id: OrderId) -> Result<Order, OrderError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        if order.user_id != user {
            return Err(OrderError::Forbidden(order_id));
        }
        Ok(order)
    }

    /// Lists the caller's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, user: UserId) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list_orders_for_user(user).await?)
    }

    /// Cancels one of the caller's orders and returns its stock.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, user: UserId, order_id: OrderId) -> Result<Order, OrderError> {
        self.get_order(user, order_id).await?;

        let order = self.store.release_order(order_id).await?;
        metrics::counter!("stock_released_total").increment(1);
        tracing::info!(%order_id, "order cancelled, stock released");
        Ok(order)
    }

    /// Claims one of the caller's orders for a payment prompt.
    ///
    /// The claim is taken before anything is sent to the payment network, so
    /// concurrent requests for the same order cannot both prompt the customer.
    #[tracing::instrument(skip(self))]
    pub async fn begin_payment(
        &self,
        user: UserId,
        order_id: OrderId,
    ) -> Result<PaymentClaim, OrderError> {
        self.get_order(user, order_id).await?;
        Ok(self.store.claim_payment(order_id).await?)
    }

    /// Records the network's checkout reference on a claimed payment.
    #[tracing::instrument(skip(self))]
    pub async fn mark_payment_initiated(
        &self,
        order_id: OrderId,
        reference: &str,
    ) -> Result<Order, OrderError> {
        let order = self
            .store
            .attach_payment_reference(order_id, reference)
            .await?;
        tracing::info!(%order_id, reference, "payment prompt sent");
        Ok(order)
    }

    /// Gives a claim back after the prompt could not be sent.
    ///
    /// The payment status returns to what it was before the claim.
    #[tracing::instrument(skip(self, claim), fields(order_id = %claim.order.id))]
    pub async fn abandon_payment(&self, claim: &PaymentClaim) -> Result<(), OrderError> {
        let restored = self
            .store
            .transition_payment(
                claim.order.id,
                PaymentStatus::Initiated,
                claim.previous,
                None,
            )
            .await?;
        if restored.is_none() {
            tracing::warn!("payment claim already settled, nothing to restore");
        }
        Ok(())
    }

    /// Applies a payment result to the order it was issued for.
    ///
    /// Returns `None` when the reference is unknown or the order has already
    /// left the `initiated` state, so repeated callbacks are harmless.
    #[tracing::instrument(skip(self), fields(reference = %outcome.reference))]
    pub async fn apply_payment_result(
        &self,
        outcome: PaymentOutcome,
    ) -> Result<Option<Order>, OrderError> {
        let Some(order) = self
            .store
            .find_order_by_payment_reference(&outcome.reference)
            .await?
        else {
            tracing::warn!("payment result for unknown reference");
            return Ok(None);
        };

        let next = if outcome.success {
            PaymentStatus::Confirmed
        } else {
            PaymentStatus::Failed
        };

        let updated = self
            .store
            .transition_payment(order.id, PaymentStatus::Initiated, next, outcome.receipt)
            .await?;

        match &updated {
            Some(order) => {
                metrics::counter!("payments_settled_total", "status" => next.as_str()).increment(1);
                tracing::info!(order_id = %order.id, status = %next, "payment settled");
            }
            None => {
                tracing::info!(order_id = %order.id, current = %order.payment_status, "payment result ignored");
            }
        }

        Ok(updated)
    }

    /// Expires payments that have been awaiting a result for longer than `older_than`.
    ///
    /// Returns the number of orders expired.
    #[tracing::instrument(skip(self))]
    pub async fn expire_stale_payments(
        &self,
        older_than: chrono::Duration,
    ) -> Result<usize, OrderError> {
        let cutoff = Utc::now() - older_than;
        let stale = self.store.list_initiated_before(cutoff).await?;

        let mut expired = 0;
        for order in stale {
            let updated = self
                .store
                .transition_payment(
                    order.id,
                    PaymentStatus::Initiated,
                    PaymentStatus::Expired,
                    None,
                )
                .await?;
            if updated.is_some() {
                expired += 1;
            }
        }

        if expired > 0 {
            metrics::counter!("payments_expired_total").increment(expired as u64);
            tracing::info!(expired, "stale payments expired");
        }
        Ok(expired)
    }
}

fn record_placement(result: &Result<Order, OrderError>) {
    match result {
        Ok(order) => {
            metrics::counter!("orders_placed_total").increment(1);
            tracing::info!(
                order_id = %order.id,
                items = order.items.len(),
                total = %order.totals.total,
                "order placed"
            );
        }
        Err(err) => {
            metrics::counter!("orders_rejected_total", "reason" => err.reason()).increment(1);
            tracing::warn!(reason = err.reason(), error = %err, "order rejected");
        }
    }
}
