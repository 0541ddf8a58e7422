//! Payment gateway trait and in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::client::{StkPushRequest, StkPushResponse, stk_amount};
use crate::error::PaymentError;
use crate::phone::normalize_phone;

/// Initiates customer-approved mobile payments.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Sends a payment prompt and returns the network's acknowledgement.
    async fn stk_push(&self, request: StkPushRequest) -> Result<StkPushResponse, PaymentError>;

    /// False when payments are disabled for lack of credentials.
    fn is_configured(&self) -> bool {
        true
    }
}

/// A push accepted by the in-memory gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPush {
    pub checkout_request_id: String,
    pub phone: String,
    pub amount: u64,
    pub account_reference: String,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    pushes: Vec<RecordedPush>,
    next_id: u32,
    fail_on_push: bool,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent pushes fail with a network error.
    pub fn set_fail_on_push(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_push = fail;
    }

    pub fn pushes(&self) -> Vec<RecordedPush> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pushes
            .clone()
    }

    pub fn push_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pushes
            .len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn stk_push(&self, request: StkPushRequest) -> Result<StkPushResponse, PaymentError> {
        let phone = normalize_phone(&request.phone)?;
        let amount = stk_amount(request.amount)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_push {
            return Err(PaymentError::Network("push declined".to_string()));
        }

        state.next_id += 1;
        let checkout_request_id = format!("ws_CO_{:06}", state.next_id);
        state.pushes.push(RecordedPush {
            checkout_request_id: checkout_request_id.clone(),
            phone,
            amount,
            account_reference: request.account_reference,
        });

        Ok(StkPushResponse {
            merchant_request_id: format!("MR-{:06}", state.next_id),
            checkout_request_id,
            response_code: "0".to_string(),
            response_description: "Success. Request accepted for processing".to_string(),
            customer_message: "Success. Request accepted for processing".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;

    fn request(phone: &str) -> StkPushRequest {
        StkPushRequest {
            phone: phone.to_string(),
            amount: Money::from_cents(5420_50),
            account_reference: "ORDER-1".to_string(),
            description: "Order payment".to_string(),
        }
    }

    #[tokio::test]
    async fn test_push_is_recorded_with_normalized_phone() {
        let gateway = InMemoryPaymentGateway::new();

        let resp = gateway.stk_push(request("0712 345 678")).await.unwrap();

        assert_eq!(resp.response_code, "0");
        let pushes = gateway.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].phone, "254712345678");
        assert_eq!(pushes[0].amount, 5421);
        assert_eq!(pushes[0].checkout_request_id, resp.checkout_request_id);
    }

    #[tokio::test]
    async fn test_fail_on_push() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_push(true);

        let result = gateway.stk_push(request("0712345678")).await;
        assert!(matches!(result, Err(PaymentError::Network(_))));
        assert_eq!(gateway.push_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_phone_is_not_pushed() {
        let gateway = InMemoryPaymentGateway::new();

        let result = gateway.stk_push(request("12345")).await;
        assert!(matches!(result, Err(PaymentError::InvalidPhone(_))));
        assert_eq!(gateway.push_count(), 0);
    }

    #[tokio::test]
    async fn test_sequential_checkout_ids() {
        let gateway = InMemoryPaymentGateway::new();

        let r1 = gateway.stk_push(request("0712345678")).await.unwrap();
        let r2 = gateway.stk_push(request("0712345678")).await.unwrap();

        assert_eq!(r1.checkout_request_id, "ws_CO_000001");
        assert_eq!(r2.checkout_request_id, "ws_CO_000002");
    }
}
