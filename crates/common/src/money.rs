//! Money represented in integer cents.

use serde::{Deserialize, Serialize};

/// A currency amount in cents, avoiding floating point in price math.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Zero amount.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is strictly positive.
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies the amount by a quantity, saturating at the i64 bounds
    /// instead of overflowing on extreme prices.
    pub const fn times(&self, quantity: u32) -> Money {
        Self(self.0.saturating_mul(quantity as i64))
    }

    /// Absolute difference to another amount, in cents.
    pub const fn abs_diff(&self, other: Money) -> i64 {
        (self.0 - other.0).abs()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}${}.{:02}", (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Money {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Money {
        Self(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);
        assert_eq!((a + b).cents(), 1250);
        assert_eq!((a - b).cents(), 750);
        assert_eq!(b.times(3).cents(), 750);
    }

    #[test]
    fn times_saturates_instead_of_overflowing() {
        let huge = Money::from_cents(i64::MAX);
        assert_eq!(huge.times(2).cents(), i64::MAX);
        assert_eq!(Money::from_cents(i64::MIN).times(3).cents(), i64::MIN);
    }

    #[test]
    fn abs_diff_is_symmetric() {
        let a = Money::from_cents(2000);
        let b = Money::from_cents(2001);
        assert_eq!(a.abs_diff(b), 1);
        assert_eq!(b.abs_diff(a), 1);
    }

    #[test]
    fn display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn sum_of_amounts() {
        let total: Money = [100, 200, 300].map(Money::from_cents).into_iter().sum();
        assert_eq!(total.cents(), 600);
    }

    #[test]
    fn serde_is_transparent() {
        let m = Money::from_cents(999);
        assert_eq!(serde_json::to_string(&m).unwrap(), "999");
    }
}
