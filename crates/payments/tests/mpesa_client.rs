//! M-Pesa client tests against a local mock of the Daraja API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::Money;
use payments::{MpesaClient, MpesaConfig, PaymentError, StkPushRequest};
use serde_json::{Value, json};
use tokio::sync::Mutex;

struct Mock {
    token_calls: AtomicUsize,
    pushes: Mutex<Vec<(Option<String>, Value)>>,
    push_status: StatusCode,
    response_code: &'static str,
    delay: Duration,
}

impl Mock {
    fn new() -> Self {
        Self {
            token_calls: AtomicUsize::new(0),
            pushes: Mutex::new(Vec::new()),
            push_status: StatusCode::OK,
            response_code: "0",
            delay: Duration::ZERO,
        }
    }
}

async fn token(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> impl IntoResponse {
    mock.token_calls.fetch_add(1, Ordering::SeqCst);
    let basic = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !basic {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    }
    // Give concurrent callers a chance to pile up behind the refresh.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Json(json!({"access_token": "mock-token", "expires_in": "3599"})).into_response()
}

async fn push(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    tokio::time::sleep(mock.delay).await;
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    mock.pushes.lock().await.push((auth, body));

    (
        mock.push_status,
        Json(json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResponseCode": mock.response_code,
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        })),
    )
}

async fn start(mock: Mock, timeout: Duration) -> (Arc<Mock>, MpesaClient) {
    let mock = Arc::new(mock);
    let app = Router::new()
        .route("/oauth/v1/generate", get(token))
        .route("/mpesa/stkpush/v1/processrequest", post(push))
        .with_state(Arc::clone(&mock));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = MpesaClient::new(MpesaConfig {
        consumer_key: "key".to_string(),
        consumer_secret: "secret".to_string(),
        short_code: "174379".to_string(),
        passkey: "passkey".to_string(),
        callback_url: "https://shop.example/payments/mpesa/callback".to_string(),
        base_url: format!("http://{addr}"),
        timeout,
    })
    .unwrap();

    (mock, client)
}

fn request() -> StkPushRequest {
    StkPushRequest {
        phone: "+254 712 345 678".to_string(),
        amount: Money::from_cents(5420_40),
        account_reference: "ORDER-42".to_string(),
        description: "Payment for order".to_string(),
    }
}

#[tokio::test]
async fn push_sends_normalized_request() {
    let (mock, client) = start(Mock::new(), Duration::from_secs(5)).await;

    let resp = client.stk_push(request()).await.unwrap();
    assert_eq!(resp.checkout_request_id, "ws_CO_191220191020363925");

    let pushes = mock.pushes.lock().await;
    let (auth, body) = &pushes[0];
    assert_eq!(auth.as_deref(), Some("Bearer mock-token"));
    assert_eq!(body["PhoneNumber"], "254712345678");
    assert_eq!(body["PartyA"], "254712345678");
    assert_eq!(body["PartyB"], "174379");
    assert_eq!(body["BusinessShortCode"], "174379");
    assert_eq!(body["Amount"], 5421);
    assert_eq!(body["TransactionType"], "CustomerPayBillOnline");
    assert_eq!(body["AccountReference"], "ORDER-42");
    assert_eq!(body["Timestamp"].as_str().map(str::len), Some(14));
}

#[tokio::test]
async fn token_is_cached_across_pushes() {
    let (mock, client) = start(Mock::new(), Duration::from_secs(5)).await;

    client.stk_push(request()).await.unwrap();
    client.stk_push(request()).await.unwrap();
    client.stk_push(request()).await.unwrap();

    assert_eq!(mock.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.pushes.lock().await.len(), 3);
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let (mock, client) = start(Mock::new(), Duration::from_secs(5)).await;
    let client = Arc::new(client);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.access_token().await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "mock-token");
    }

    assert_eq!(mock.token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_push_is_network_error() {
    let mock = Mock {
        response_code: "1",
        ..Mock::new()
    };
    let (_mock, client) = start(mock, Duration::from_secs(5)).await;

    let err = client.stk_push(request()).await.unwrap_err();
    assert!(matches!(err, PaymentError::Network(_)));
}

#[tokio::test]
async fn server_error_is_network_error() {
    let mock = Mock {
        push_status: StatusCode::INTERNAL_SERVER_ERROR,
        ..Mock::new()
    };
    let (_mock, client) = start(mock, Duration::from_secs(5)).await;

    let err = client.stk_push(request()).await.unwrap_err();
    assert!(matches!(err, PaymentError::Network(_)));
}

#[tokio::test]
async fn slow_network_times_out() {
    let mock = Mock {
        delay: Duration::from_secs(2),
        ..Mock::new()
    };
    let (_mock, client) = start(mock, Duration::from_millis(300)).await;

    let err = client.stk_push(request()).await.unwrap_err();
    assert!(matches!(err, PaymentError::Network(_)));
}

#[tokio::test]
async fn invalid_phone_never_reaches_network() {
    let (mock, client) = start(Mock::new(), Duration::from_secs(5)).await;

    let err = client
        .stk_push(StkPushRequest {
            phone: "12345".to_string(),
            ..request()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::InvalidPhone(_)));
    assert_eq!(mock.token_calls.load(Ordering::SeqCst), 0);
}
