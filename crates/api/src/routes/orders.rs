//! Order placement, lookup and cancellation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::Order;
use payments::OrderConfirmation;
use store::Store;

use super::{AppState, parse_order_id};
use crate::auth::{CurrentUser, MaybeUser};
use crate::error::ApiError;

/// POST /orders — place an order from the caller's cart.
///
/// Identity is checked before the body is looked at, so an anonymous caller
/// gets 401 even for a malformed payload.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    MaybeUser(user): MaybeUser,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let payload = match body {
        Ok(Json(payload)) => payload,
        Err(_) if user.is_none() => return Err(ApiError::Unauthorized),
        Err(rejection) => return Err(ApiError::BadRequest(rejection.body_text())),
    };

    let order = state.orders.place_order_from_json(user, &payload).await?;

    let notifier = Arc::clone(&state.notifier);
    let confirmation = OrderConfirmation::from(&order);
    tokio::spawn(async move {
        if let Err(err) = notifier.order_placed(&confirmation).await {
            tracing::warn!(order_id = %confirmation.order_id, error = %err, "order confirmation not sent");
        }
    });

    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders — the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.list_orders(user).await?))
}

/// GET /orders/{id} — load one of the caller's orders.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.orders.get_order(user, order_id).await?))
}

/// POST /orders/{id}/cancel — cancel an order and return its stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.orders.cancel_order(user, order_id).await?))
}
