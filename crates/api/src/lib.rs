//! HTTP API server for storefront order placement.
//!
//! Provides REST endpoints for the catalog, order placement and
//! cancellation, and M-Pesa payments, with structured logging (tracing)
//! and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use domain::OrderService;
use metrics_exporter_prometheus::PrometheusHandle;
use payments::{MpesaClient, PaymentError, TracingNotifier};
use store::Store;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health::<S>))
        .route("/products", get(routes::products::list::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route("/categories", get(routes::products::categories::<S>))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/orders/{id}/pay/mpesa",
            post(routes::payments::initiate_mpesa::<S>),
        )
        .route(
            "/payments/mpesa/callback",
            post(routes::payments::mpesa_callback::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the production application state: M-Pesa from the environment
/// and log-based order confirmations.
pub fn create_default_state<S: Store + 'static>(
    store: S,
    config: &Config,
) -> Result<Arc<AppState<S>>, PaymentError> {
    Ok(Arc::new(AppState {
        orders: OrderService::with_pricing(store, config.pricing),
        payments: Arc::new(MpesaClient::from_env()?),
        notifier: Arc::new(TracingNotifier),
    }))
}

/// Periodically expires payments that never received a result.
pub fn spawn_payment_sweep<S: Store + 'static>(
    state: Arc<AppState<S>>,
    interval: Duration,
    expiry: Duration,
) -> JoinHandle<()> {
    let older_than = chrono::Duration::from_std(expiry).unwrap_or(chrono::Duration::MAX);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = state.orders.expire_stale_payments(older_than).await {
                tracing::warn!(error = %err, "payment sweep failed");
            }
        }
    })
}
