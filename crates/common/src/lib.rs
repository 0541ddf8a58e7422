//! Shared types for the storefront workspace.

mod catalog;
mod ids;
mod money;
mod order;
mod pricing;

pub use catalog::{Category, Product};
pub use ids::{CategoryId, OrderId, ProductId, UserId};
pub use money::Money;
pub use order::{
    Address, DraftItem, Order, OrderDraft, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
    StockShortage,
};
pub use pricing::{PricingPolicy, Totals};
