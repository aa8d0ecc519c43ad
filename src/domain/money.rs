use crate::error::{EscrowError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A running monetary total held on an escrow account.
///
/// Wraps `rust_decimal::Decimal` so ledger arithmetic stays exact and
/// cannot be mixed up with raw payload numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub Decimal);

/// A strictly positive amount moved by a single provider transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(EscrowError::invalid_field(
                "amount",
                "must be greater than zero",
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EscrowError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// Tolerance rules for comparing ledger totals.
///
/// Amounts are exact decimals, so the default tolerance is zero. Operators
/// dealing with a provider that rounds differently can widen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerPolicy {
    pub tolerance: Decimal,
}

impl LedgerPolicy {
    pub fn new(tolerance: Decimal) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    /// `value ≤ ε`
    pub fn is_settled(&self, residual: Balance) -> bool {
        residual.0 <= self.tolerance
    }

    /// `funded ≥ expected − ε`
    pub fn covers(&self, funded: Balance, expected: Balance) -> bool {
        funded.0 >= expected.0 - self.tolerance
    }

    /// `residual ≥ −ε`
    pub fn is_solvent(&self, residual: Balance) -> bool {
        residual.0 >= -self.tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_arithmetic() {
        let b1 = Balance::new(dec!(10.0));
        let b2 = Balance::new(dec!(5.0));
        assert_eq!(b1 + b2, Balance::new(dec!(15.0)));
        assert_eq!(b1 - b2, Balance::new(dec!(5.0)));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(EscrowError::Validation(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(EscrowError::Validation(_))
        ));
    }

    #[test]
    fn test_balance_display_is_normalized() {
        assert_eq!(Balance::new(dec!(1000.00)).to_string(), "1000");
        assert_eq!(Balance::new(dec!(0.1500)).to_string(), "0.15");
    }

    #[test]
    fn test_exact_policy() {
        let policy = LedgerPolicy::default();
        assert!(policy.is_settled(Balance::ZERO));
        assert!(!policy.is_settled(Balance::new(dec!(0.0001))));
        assert!(policy.covers(Balance::new(dec!(1000)), Balance::new(dec!(1000))));
        assert!(!policy.covers(Balance::new(dec!(999.99)), Balance::new(dec!(1000))));
        assert!(!policy.is_solvent(Balance::new(dec!(-0.01))));
    }

    #[test]
    fn test_tolerant_policy() {
        let policy = LedgerPolicy::new(dec!(-0.01));
        assert_eq!(policy.tolerance, dec!(0.01));
        assert!(policy.is_settled(Balance::new(dec!(0.005))));
        assert!(policy.covers(Balance::new(dec!(999.99)), Balance::new(dec!(1000))));
        assert!(policy.is_solvent(Balance::new(dec!(-0.01))));
        assert!(!policy.is_solvent(Balance::new(dec!(-0.02))));
    }
}
