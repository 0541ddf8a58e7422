//! M-Pesa payment initiation and callback endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, PaymentStatus};
use domain::PaymentOutcome;
use payments::{PaymentError, StkCallback, StkPushRequest};
use serde::{Deserialize, Serialize};
use store::Store;

use super::{AppState, parse_order_id};
use crate::auth::CurrentUser;
use crate::error::ApiError;

/// Longest account reference the network displays to the customer.
const ACCOUNT_REFERENCE_LEN: usize = 12;

#[derive(Debug, Default, Deserialize)]
pub struct InitiatePaymentRequest {
    /// Phone to prompt; defaults to the shipping address phone.
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentResponse {
    pub order_id: OrderId,
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub customer_message: String,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: &'static str,
}

fn account_reference(order_id: OrderId) -> String {
    order_id
        .to_string()
        .chars()
        .filter(|c| *c != '-')
        .take(ACCOUNT_REFERENCE_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// POST /orders/{id}/pay/mpesa — prompt the customer's phone for payment.
#[tracing::instrument(skip(state, body))]
pub async fn initiate_mpesa<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    body: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<InitiatePaymentResponse>), ApiError> {
    let Json(body) = body.map_err(|r| ApiError::BadRequest(r.body_text()))?;
    let order_id = parse_order_id(&id)?;

    if !state.payments.is_configured() {
        return Err(PaymentError::NotConfigured.into());
    }

    let claim = state.orders.begin_payment(user, order_id).await?;
    let order = &claim.order;

    let reference = account_reference(order.id);
    let pushed = state
        .payments
        .stk_push(StkPushRequest {
            phone: body
                .phone
                .unwrap_or_else(|| order.shipping_address.phone.clone()),
            amount: order.totals.total,
            account_reference: reference.clone(),
            description: format!("Order {reference}"),
        })
        .await;

    let ack = match pushed {
        Ok(ack) => ack,
        Err(err) => {
            if let Err(restore) = state.orders.abandon_payment(&claim).await {
                tracing::error!(error = %restore, "failed to release payment claim");
            }
            return Err(err.into());
        }
    };

    let order = state
        .orders
        .mark_payment_initiated(order_id, &ack.checkout_request_id)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(InitiatePaymentResponse {
            order_id: order.id,
            checkout_request_id: ack.checkout_request_id,
            merchant_request_id: ack.merchant_request_id,
            customer_message: ack.customer_message,
            payment_status: order.payment_status,
        }),
    ))
}

/// POST /payments/mpesa/callback — payment result from the network.
///
/// Unknown or already settled references are acknowledged so the network
/// stops retrying.
#[tracing::instrument(skip(state, body))]
pub async fn mpesa_callback<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<CallbackAck>, ApiError> {
    let Json(payload) = body.map_err(|r| ApiError::BadRequest(r.body_text()))?;
    let callback = StkCallback::from_json(&payload)?;

    tracing::info!(
        checkout_request_id = %callback.checkout_request_id,
        result_code = callback.result_code,
        result_desc = %callback.result_desc,
        "payment callback received"
    );

    state
        .orders
        .apply_payment_result(PaymentOutcome {
            reference: callback.checkout_request_id.clone(),
            success: callback.is_success(),
            receipt: callback.result.receipt_number.clone(),
        })
        .await?;

    Ok(Json(CallbackAck {
        result_code: 0,
        result_desc: "Accepted",
    }))
}
