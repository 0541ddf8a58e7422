//! Daraja STK push client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{NaiveDateTime, TimeDelta, Utc};
use common::Money;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::MpesaConfig;
use crate::error::PaymentError;
use crate::gateway::PaymentGateway;
use crate::phone::normalize_phone;

/// Seconds shaved off a token's declared lifetime before it is refreshed.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

/// Rounds an amount up to the whole currency units the network accepts.
pub fn stk_amount(amount: Money) -> Result<u64, PaymentError> {
    amount
        .whole_units_ceil()
        .filter(|units| *units > 0)
        .ok_or(PaymentError::InvalidAmount(amount))
}

/// Password for a push request: base64 of short code, passkey and timestamp.
pub fn stk_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{short_code}{passkey}{timestamp}"))
}

/// Request timestamp in `YYYYMMDDHHMMSS`, East Africa Time.
pub fn stk_timestamp(now: NaiveDateTime) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// A payment prompt to send to the customer's phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StkPushRequest {
    /// Phone number as entered; normalized before sending.
    pub phone: String,
    pub amount: Money,
    pub account_reference: String,
    pub description: String,
}

/// The network's acknowledgement of a push request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: u64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Seconds,
}

/// Daraja sends `expires_in` as a string; accept a number too.
#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(u64),
    Text(String),
}

impl Seconds {
    fn as_secs(&self) -> Option<u64> {
        match self {
            Seconds::Number(n) => Some(*n),
            Seconds::Text(s) => s.trim().parse().ok(),
        }
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

struct Configured {
    config: MpesaConfig,
    http: reqwest::Client,
    /// Held across a refresh so concurrent callers share one token request.
    token: Mutex<Option<CachedToken>>,
}

/// Client for the M-Pesa STK push API.
pub struct MpesaClient {
    inner: Option<Configured>,
}

impl MpesaClient {
    /// Creates a client for the given configuration.
    pub fn new(config: MpesaConfig) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::Network(format!("failed to build http client: {e}")))?;

        Ok(Self {
            inner: Some(Configured {
                config,
                http,
                token: Mutex::new(None),
            }),
        })
    }

    /// A client that fails every call with `NotConfigured`.
    pub fn unconfigured() -> Self {
        Self { inner: None }
    }

    /// Builds a client from environment variables, unconfigured when any is missing.
    pub fn from_env() -> Result<Self, PaymentError> {
        match MpesaConfig::from_env() {
            Some(config) => Self::new(config),
            None => {
                tracing::warn!("M-Pesa credentials not set, payments disabled");
                Ok(Self::unconfigured())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    fn configured(&self) -> Result<&Configured, PaymentError> {
        self.inner.as_ref().ok_or(PaymentError::NotConfigured)
    }

    /// Returns a bearer token, fetching a new one only when the cached one expired.
    pub async fn access_token(&self) -> Result<String, PaymentError> {
        let inner = self.configured()?;
        let mut cached = inner.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            inner.config.base_url
        );
        let resp = inner
            .http
            .get(&url)
            .basic_auth(&inner.config.consumer_key, Some(&inner.config.consumer_secret))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(PaymentError::Network(format!(
                "token request failed status={}",
                resp.status()
            )));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| PaymentError::Network(format!("invalid token response: {e}")))?;
        let lifetime = body
            .expires_in
            .as_secs()
            .ok_or_else(|| PaymentError::Network("invalid token lifetime".to_string()))?;

        metrics::counter!("mpesa_token_refresh_total").increment(1);
        tracing::debug!(lifetime, "fetched M-Pesa access token");

        let ttl = lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);
        *cached = (ttl > 0).then(|| CachedToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        });

        Ok(body.access_token)
    }

    /// Sends a payment prompt to the customer's phone.
    ///
    /// No retry is attempted; any failure surfaces as `PaymentError::Network`.
    #[tracing::instrument(skip(self, request), fields(reference = %request.account_reference))]
    pub async fn stk_push(&self, request: StkPushRequest) -> Result<StkPushResponse, PaymentError> {
        let inner = self.configured()?;
        let phone = normalize_phone(&request.phone)?;
        let amount = stk_amount(request.amount)?;

        let token = self.access_token().await?;

        let eat_now = Utc::now().naive_utc() + TimeDelta::hours(3);
        let timestamp = stk_timestamp(eat_now);
        let config = &inner.config;
        let body = StkPushBody {
            business_short_code: &config.short_code,
            password: stk_password(&config.short_code, &config.passkey, &timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount,
            party_a: &phone,
            party_b: &config.short_code,
            phone_number: &phone,
            callback_url: &config.callback_url,
            account_reference: &request.account_reference,
            transaction_desc: &request.description,
        };

        let started = Instant::now();
        let result = self.send_push(inner, &token, &body).await;
        metrics::histogram!("mpesa_stk_push_duration_seconds").record(started.elapsed().as_secs_f64());

        let outcome = if result.is_ok() { "accepted" } else { "error" };
        metrics::counter!("mpesa_stk_push_total", "outcome" => outcome).increment(1);

        match &result {
            Ok(resp) => tracing::info!(
                checkout_request_id = %resp.checkout_request_id,
                amount,
                "STK push accepted"
            ),
            Err(err) => tracing::warn!(error = %err, "STK push failed"),
        }
        result
    }

    async fn send_push(
        &self,
        inner: &Configured,
        token: &str,
        body: &StkPushBody<'_>,
    ) -> Result<StkPushResponse, PaymentError> {
        let url = format!("{}/mpesa/stkpush/v1/processrequest", inner.config.base_url);
        let resp = inner
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(PaymentError::Network(format!(
                "push request failed status={status} body={detail}"
            )));
        }

        let parsed: StkPushResponse = resp
            .json()
            .await
            .map_err(|e| PaymentError::Network(format!("invalid push response: {e}")))?;

        if parsed.response_code != "0" {
            return Err(PaymentError::Network(format!(
                "push rejected code={} description={}",
                parsed.response_code, parsed.response_description
            )));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl PaymentGateway for MpesaClient {
    async fn stk_push(&self, request: StkPushRequest) -> Result<StkPushResponse, PaymentError> {
        MpesaClient::stk_push(self, request).await
    }

    fn is_configured(&self) -> bool {
        MpesaClient::is_configured(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_amount_rounds_up_to_whole_units() {
        assert_eq!(stk_amount(Money::from_cents(5420_00)).unwrap(), 5420);
        assert_eq!(stk_amount(Money::from_cents(1001)).unwrap(), 11);
        assert_eq!(stk_amount(Money::from_cents(1)).unwrap(), 1);
    }

    #[test]
    fn test_amount_must_be_positive() {
        assert!(matches!(
            stk_amount(Money::zero()),
            Err(PaymentError::InvalidAmount(_))
        ));
        assert!(matches!(
            stk_amount(Money::from_cents(-500)),
            Err(PaymentError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_password_and_timestamp() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap();
        let timestamp = stk_timestamp(at);
        assert_eq!(timestamp, "20240309140507");

        let password = stk_password("174379", "pk", &timestamp);
        let decoded = STANDARD.decode(password).unwrap();
        assert_eq!(decoded, b"174379pk20240309140507");
    }

    #[tokio::test]
    async fn test_unconfigured_client_fails_before_network() {
        let client = MpesaClient::unconfigured();

        assert!(matches!(
            client.access_token().await,
            Err(PaymentError::NotConfigured)
        ));
        let result = client
            .stk_push(StkPushRequest {
                phone: "0712345678".to_string(),
                amount: Money::from_units(10),
                account_reference: "ORDER".to_string(),
                description: "Order payment".to_string(),
            })
            .await;
        assert!(matches!(result, Err(PaymentError::NotConfigured)));
    }
}
