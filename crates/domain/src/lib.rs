//! Order placement domain.
//!
//! This crate turns a storefront checkout payload into a persisted order:
//! - Structural validation with field-level error reporting
//! - Stock reservation through the store's transactional boundary
//! - Cancellation with symmetric stock release
//! - Reconciliation of asynchronous payment results

pub mod order;

pub use order::{
    AddressRequest, CartItemRequest, FieldError, MAX_LINE_QUANTITY, OrderError, OrderService,
    PaymentOutcome, PlaceOrderRequest, ValidatedOrder, is_valid_phone, validate,
};
