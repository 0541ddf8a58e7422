//! Catalog and order persistence.
//!
//! The [`Store`] trait is the transactional boundary for stock: placing an
//! order checks and decrements stock for every line and writes the order in
//! one unit, and releasing an order returns its stock in one unit.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{PaymentClaim, Placement, Store, plan_placement};
