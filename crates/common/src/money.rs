//! Currency amounts in minor units.

use serde::{Deserialize, Serialize};

/// Money amount represented in minor units (cents) to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new amount from minor units.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new amount from whole currency units.
    pub fn from_units(units: i64) -> Self {
        Self { cents: units * 100 }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-unit portion.
    pub fn units(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the minor-unit remainder.
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * i64::from(quantity),
        }
    }

    /// Applies a rate expressed in basis points (1600 = 16%), rounding half up.
    pub fn percent_bps(&self, bps: u32) -> Money {
        let scaled = self.cents * i64::from(bps);
        Money {
            cents: (scaled + 5_000) / 10_000,
        }
    }

    /// Rounds up to the nearest whole currency unit.
    ///
    /// Returns `None` for zero or negative amounts.
    pub fn whole_units_ceil(&self) -> Option<u64> {
        if self.cents <= 0 {
            return None;
        }
        u64::try_from((self.cents + 99) / 100).ok()
    }

    /// Absolute difference between two amounts.
    pub fn abs_diff(&self, other: Money) -> Money {
        Money {
            cents: (self.cents - other.cents).abs(),
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-KES {}.{:02}", self.units().abs(), self.cents_part())
        } else {
            write!(f, "KES {}.{:02}", self.units(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents - rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.units(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "KES 12.34");
        assert_eq!(Money::from_cents(5).to_string(), "KES 0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-KES 12.34");
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!(a.multiply(3).cents(), 3000);
        assert_eq!(b.abs_diff(a).cents(), 500);
    }

    #[test]
    fn test_percent_bps_rounds_half_up() {
        assert_eq!(Money::from_cents(10_000).percent_bps(1600).cents(), 1600);
        // 0.16 * 1003 = 160.48
        assert_eq!(Money::from_cents(1003).percent_bps(1600).cents(), 160);
        // 0.05 * 1010 = 50.5
        assert_eq!(Money::from_cents(1010).percent_bps(500).cents(), 51);
    }

    #[test]
    fn test_whole_units_ceil() {
        assert_eq!(Money::from_cents(100).whole_units_ceil(), Some(1));
        assert_eq!(Money::from_cents(101).whole_units_ceil(), Some(2));
        assert_eq!(Money::from_cents(1).whole_units_ceil(), Some(1));
        assert_eq!(Money::zero().whole_units_ceil(), None);
        assert_eq!(Money::from_cents(-500).whole_units_ceil(), None);
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [100, 250, 50].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 400);
    }
}
