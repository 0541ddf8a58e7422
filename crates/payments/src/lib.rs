//! Mobile-money payments for placed orders.
//!
//! This crate provides:
//! - M-Pesa STK push initiation with bearer-token caching
//! - Phone number and amount normalization for the payment network
//! - Parsing of asynchronous payment result callbacks
//! - Order confirmation notifications

pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod notifier;
pub mod phone;

pub use callback::{CallbackResult, StkCallback};
pub use client::{MpesaClient, StkPushRequest, StkPushResponse, stk_amount, stk_password, stk_timestamp};
pub use config::{MpesaConfig, MpesaEnvironment};
pub use error::{NotifyError, PaymentError};
pub use gateway::{InMemoryPaymentGateway, PaymentGateway, RecordedPush};
pub use notifier::{InMemoryNotifier, Notifier, OrderConfirmation, TracingNotifier};
pub use phone::normalize_phone;
