//! Integration tests for the order workflow.
//!
//! These tests drive `OrderService` end to end against the in-memory store,
//! covering placement, rejection paths, cancellation and payment
//! reconciliation.

use std::sync::Arc;

use common::{Money, OrderStatus, PaymentStatus, PricingPolicy, Product, ProductId, UserId};
use domain::{
    AddressRequest, CartItemRequest, OrderError, OrderService, PaymentOutcome, PlaceOrderRequest,
};
use store::{InMemoryStore, Store};

fn address() -> AddressRequest {
    AddressRequest {
        name: Some("Achieng Otieno".to_string()),
        phone: Some("0712345678".to_string()),
        address: Some("Oginga Odinga Street 3".to_string()),
        city: Some("Kisumu".to_string()),
        state: Some("Kisumu".to_string()),
        zip: Some("40100".to_string()),
    }
}

fn line(product_id: &str, quantity: u32, price: u32) -> CartItemRequest {
    CartItemRequest {
        product_id: Some(product_id.to_string()),
        quantity: Some(f64::from(quantity)),
        price: Some(f64::from(price)),
        name: Some(format!("Product {product_id}")),
        image: None,
    }
}

/// Builds a request whose totals match the default pricing policy.
fn request(lines: Vec<CartItemRequest>) -> PlaceOrderRequest {
    let subtotal: f64 = lines
        .iter()
        .map(|l| l.price.unwrap_or(0.0) * l.quantity.unwrap_or(0.0))
        .sum();
    let quote = PricingPolicy::default().quote(Money::from_cents((subtotal * 100.0).round() as i64));
    PlaceOrderRequest {
        items: Some(lines),
        subtotal: Some(subtotal),
        shipping: Some(quote.shipping.cents() as f64 / 100.0),
        tax: Some(quote.tax.cents() as f64 / 100.0),
        total: Some(quote.total.cents() as f64 / 100.0),
        payment_method: Some("mpesa".to_string()),
        shipping_address: Some(address()),
        billing_address: Some(address()),
    }
}

async fn service_with(products: &[(&str, u32, u32)]) -> OrderService<InMemoryStore> {
    let store = InMemoryStore::new();
    for (id, price, stock) in products {
        store
            .upsert_product(Product::new(
                *id,
                format!("Product {id}"),
                Money::from_units(i64::from(*price)),
                *stock,
            ))
            .await
            .unwrap();
    }
    OrderService::new(store)
}

async fn stock_of(service: &OrderService<InMemoryStore>, id: &str) -> u32 {
    service
        .store()
        .get_product(&ProductId::new(id))
        .await
        .unwrap()
        .unwrap()
        .stock
}

mod placement {
    use super::*;

    #[tokio::test]
    async fn order_within_stock_is_placed() {
        let service = service_with(&[("P1", 1500, 5)]).await;
        let user = UserId::new();

        let order = service
            .place_order(Some(user), &request(vec![line("P1", 3, 1500)]))
            .await
            .unwrap();

        assert_eq!(stock_of(&service, "P1").await, 2);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.totals.subtotal, Money::from_units(4500));
        assert_eq!(order.totals.shipping, Money::from_units(200));
        assert_eq!(order.totals.tax, Money::from_units(720));
        assert_eq!(order.totals.total, Money::from_units(5420));
        assert_eq!(order.items[0].unit_price, Money::from_units(1500));
    }

    #[tokio::test]
    async fn shortage_rejects_whole_order() {
        let service = service_with(&[("P1", 100, 10), ("P2", 100, 2)]).await;

        let err = service
            .place_order(
                Some(UserId::new()),
                &request(vec![line("P1", 4, 100), line("P2", 3, 100)]),
            )
            .await
            .unwrap_err();

        let OrderError::InsufficientStock(shortages) = &err else {
            panic!("expected insufficient stock, got {err:?}");
        };
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].product_id, ProductId::new("P2"));
        assert_eq!(shortages[0].available, 2);
        assert_eq!(shortages[0].requested, 3);
        assert_eq!(err.to_string(), "Insufficient stock for Product P2");

        assert_eq!(stock_of(&service, "P1").await, 10);
        assert_eq!(stock_of(&service, "P2").await, 2);
        assert_eq!(service.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_store() {
        let service = service_with(&[("P1", 100, 5)]).await;
        let mut req = request(vec![line("P1", 1, 100)]);
        req.shipping_address.as_mut().unwrap().phone = None;

        let err = service
            .place_order(Some(UserId::new()), &req)
            .await
            .unwrap_err();

        let OrderError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors[0].field, "shippingAddress.phone");
        assert_eq!(stock_of(&service, "P1").await, 5);
        assert_eq!(service.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let service = service_with(&[("P1", 100, 5)]).await;

        let err = service
            .place_order(
                Some(UserId::new()),
                &request(vec![line("P1", 1, 100), line("GONE", 1, 100)]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::NotFound { ref product_id } if product_id.as_str() == "GONE"));
        assert_eq!(stock_of(&service, "P1").await, 5);
    }

    #[tokio::test]
    async fn stale_client_price_is_rejected() {
        let service = service_with(&[("P1", 120, 5)]).await;

        let err = service
            .place_order(Some(UserId::new()), &request(vec![line("P1", 2, 100)]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::TotalMismatch { .. }));
        assert_eq!(stock_of(&service, "P1").await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_orders_for_last_units() {
        let service = Arc::new(service_with(&[("P1", 100, 5)]).await);

        let a = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .place_order(Some(UserId::new()), &request(vec![line("P1", 3, 100)]))
                    .await
            })
        };
        let b = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .place_order(Some(UserId::new()), &request(vec![line("P1", 3, 100)]))
                    .await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let placed = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(OrderError::InsufficientStock(_))))
            .count();

        assert_eq!(placed, 1);
        assert_eq!(short, 1);
        assert_eq!(stock_of(&service, "P1").await, 2);
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancel_returns_stock_once() {
        let service = service_with(&[("P1", 100, 5), ("P2", 100, 1)]).await;
        let user = UserId::new();
        let order = service
            .place_order(
                Some(user),
                &request(vec![line("P1", 2, 100), line("P2", 1, 100)]),
            )
            .await
            .unwrap();
        assert_eq!(stock_of(&service, "P2").await, 0);

        let cancelled = service.cancel_order(user, order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&service, "P1").await, 5);
        assert_eq!(stock_of(&service, "P2").await, 1);

        let err = service.cancel_order(user, order.id).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidStatus { .. }));
        assert_eq!(stock_of(&service, "P1").await, 5);
    }

    #[tokio::test]
    async fn orders_are_listed_per_user() {
        let service = service_with(&[("P1", 100, 50)]).await;
        let user = UserId::new();
        let other = UserId::new();

        let first = service
            .place_order(Some(user), &request(vec![line("P1", 1, 100)]))
            .await
            .unwrap();
        let second = service
            .place_order(Some(user), &request(vec![line("P1", 2, 100)]))
            .await
            .unwrap();
        service
            .place_order(Some(other), &request(vec![line("P1", 1, 100)]))
            .await
            .unwrap();

        let orders = service.list_orders(user).await.unwrap();
        let ids: Vec<_> = orders.iter().map(|o| o.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id));
        assert!(ids.contains(&second.id));
    }
}

mod payments {
    use super::*;

    async fn placed_order(service: &OrderService<InMemoryStore>) -> common::Order {
        service
            .place_order(Some(UserId::new()), &request(vec![line("P1", 1, 100)]))
            .await
            .unwrap()
    }

    async fn initiate(
        service: &OrderService<InMemoryStore>,
        order: &common::Order,
        reference: &str,
    ) -> common::Order {
        service.begin_payment(order.user_id, order.id).await.unwrap();
        service
            .mark_payment_initiated(order.id, reference)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn successful_result_confirms_payment() {
        let service = service_with(&[("P1", 100, 5)]).await;
        let order = placed_order(&service).await;

        initiate(&service, &order, "ws_CO_1").await;

        let outcome = PaymentOutcome {
            reference: "ws_CO_1".to_string(),
            success: true,
            receipt: Some("QKJ4XYZ123".to_string()),
        };
        let updated = service
            .apply_payment_result(outcome.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.payment_status, PaymentStatus::Confirmed);
        assert_eq!(updated.payment_receipt.as_deref(), Some("QKJ4XYZ123"));

        // A repeated callback is ignored.
        assert!(service.apply_payment_result(outcome).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_result_allows_retry() {
        let service = service_with(&[("P1", 100, 5)]).await;
        let order = placed_order(&service).await;
        initiate(&service, &order, "ws_CO_2").await;

        let updated = service
            .apply_payment_result(PaymentOutcome {
                reference: "ws_CO_2".to_string(),
                success: false,
                receipt: None,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.payment_status, PaymentStatus::Failed);

        let retried = initiate(&service, &order, "ws_CO_3").await;
        assert_eq!(retried.payment_status, PaymentStatus::Initiated);
        assert_eq!(retried.payment_reference.as_deref(), Some("ws_CO_3"));
    }

    #[tokio::test]
    async fn second_initiation_conflicts() {
        let service = service_with(&[("P1", 100, 5)]).await;
        let order = placed_order(&service).await;
        initiate(&service, &order, "ws_CO_4").await;

        let err = service
            .begin_payment(order.user_id, order.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::PaymentConflict(PaymentStatus::Initiated)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_initiations_claim_once() {
        let service = Arc::new(service_with(&[("P1", 100, 5)]).await);
        let order = placed_order(&service).await;
        let (user, order_id) = (order.user_id, order.id);

        let attempts: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.begin_payment(user, order_id).await })
            })
            .collect();

        let mut claimed = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => claimed += 1,
                Err(err) => assert!(matches!(err, OrderError::PaymentConflict(_))),
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn unknown_reference_is_ignored() {
        let service = service_with(&[("P1", 100, 5)]).await;

        let result = service
            .apply_payment_result(PaymentOutcome {
                reference: "ws_CO_missing".to_string(),
                success: true,
                receipt: None,
            })
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn stale_payments_expire() {
        let service = service_with(&[("P1", 100, 5)]).await;
        let stale = placed_order(&service).await;
        let fresh = placed_order(&service).await;
        initiate(&service, &stale, "ws_CO_old").await;
        initiate(&service, &fresh, "ws_CO_new").await;
        service
            .store()
            .set_order_updated_at(stale.id, chrono::Utc::now() - chrono::Duration::minutes(30))
            .await;

        let expired = service
            .expire_stale_payments(chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(expired, 1);

        let stale = service.store().get_order(stale.id).await.unwrap().unwrap();
        let fresh = service.store().get_order(fresh.id).await.unwrap().unwrap();
        assert_eq!(stale.payment_status, PaymentStatus::Expired);
        assert_eq!(fresh.payment_status, PaymentStatus::Initiated);
    }
}
