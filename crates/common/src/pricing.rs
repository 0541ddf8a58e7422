//! Server-side order totals.

use serde::{Deserialize, Serialize};

use crate::Money;

/// Subtotal, shipping, tax and grand total of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

/// Rules used to recompute totals from authoritative catalog prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Tax applied to the subtotal, in basis points.
    pub tax_rate_bps: u32,
    /// Flat shipping fee charged below the free-shipping threshold.
    pub shipping_flat: Money,
    /// Subtotal at or above which shipping is free. `None` disables free shipping.
    pub free_shipping_threshold: Option<Money>,
    /// Largest accepted difference between client and server totals.
    pub tolerance: Money,
}

impl PricingPolicy {
    /// Computes totals for a subtotal.
    pub fn quote(&self, subtotal: Money) -> Totals {
        let shipping = match self.free_shipping_threshold {
            Some(threshold) if subtotal >= threshold => Money::zero(),
            _ if subtotal.is_zero() => Money::zero(),
            _ => self.shipping_flat,
        };
        let tax = subtotal.percent_bps(self.tax_rate_bps);
        Totals {
            subtotal,
            shipping,
            tax,
            total: subtotal + shipping + tax,
        }
    }

    /// Returns true if the client's grand total is within tolerance of the server's.
    pub fn accepts(&self, client: &Totals, server: &Totals) -> bool {
        client.total.abs_diff(server.total) <= self.tolerance
    }
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 1600,
            shipping_flat: Money::from_units(200),
            free_shipping_threshold: Some(Money::from_units(5000)),
            tolerance: Money::from_units(1),
        }
    }
}
