//! Parsing of STK push result callbacks.

use chrono::NaiveDateTime;
use common::Money;
use serde::Deserialize;
use serde_json::Value;

use crate::error::PaymentError;

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Body")]
    body: Body,
}

#[derive(Deserialize)]
struct Body {
    #[serde(rename = "stkCallback")]
    stk_callback: RawCallback,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCallback {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    result_code: i64,
    #[serde(default)]
    result_desc: String,
    callback_metadata: Option<RawMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawMetadata {
    #[serde(default)]
    item: Vec<RawItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawItem {
    name: String,
    #[serde(default)]
    value: Option<Value>,
}

/// Details the network attaches to a successful payment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackResult {
    pub amount: Option<Money>,
    pub receipt_number: Option<String>,
    pub phone_number: Option<String>,
    pub transaction_date: Option<NaiveDateTime>,
}

/// Result of a payment prompt, delivered asynchronously by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StkCallback {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
    pub result: CallbackResult,
}

impl StkCallback {
    /// Parses the `Body.stkCallback` envelope.
    pub fn from_json(value: &Value) -> Result<Self, PaymentError> {
        let envelope = Envelope::deserialize(value)
            .map_err(|e| PaymentError::MalformedCallback(e.to_string()))?;
        let raw = envelope.body.stk_callback;

        if raw.checkout_request_id.trim().is_empty() {
            return Err(PaymentError::MalformedCallback(
                "empty CheckoutRequestID".to_string(),
            ));
        }

        let mut result = CallbackResult::default();
        for item in raw.callback_metadata.map(|m| m.item).unwrap_or_default() {
            let Some(value) = item.value else { continue };
            match item.name.as_str() {
                "Amount" => result.amount = value.as_f64().map(units_to_money),
                "MpesaReceiptNumber" => result.receipt_number = scalar_string(&value),
                "PhoneNumber" => result.phone_number = scalar_string(&value),
                "TransactionDate" => {
                    result.transaction_date = scalar_string(&value)
                        .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y%m%d%H%M%S").ok())
                }
                _ => {}
            }
        }

        Ok(Self {
            merchant_request_id: raw.merchant_request_id,
            checkout_request_id: raw.checkout_request_id,
            result_code: raw.result_code,
            result_desc: raw.result_desc,
            result,
        })
    }

    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

fn units_to_money(units: f64) -> Money {
    Money::from_cents((units * 100.0).round() as i64)
}

/// Numbers and strings both appear as metadata values.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
