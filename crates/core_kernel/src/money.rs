//! Monetary amounts with precise decimal arithmetic
//!
//! The billing engine works in a single implied currency, so an amount is a
//! plain non-negative decimal. `Amount` wraps `rust_decimal::Decimal` to keep
//! floating-point errors out of installment sums and to make the
//! non-negativity of ledger values a property of the type.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;
use thiserror::Error;

/// Number of decimal places kept internally
const INTERNAL_SCALE: u32 = 4;

/// Number of decimal places used for display
const DISPLAY_SCALE: usize = 2;

/// Errors that can occur during amount operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// A non-negative monetary amount
///
/// Amounts are stored with 4 decimal places and displayed with 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// The zero amount
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Creates a new amount, rejecting negative values
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value < Decimal::ZERO {
            return Err(MoneyError::NegativeAmount(value));
        }
        Ok(Self(value.round_dp(INTERNAL_SCALE)))
    }

    /// Creates an amount from minor units (e.g., cents)
    pub fn from_minor(minor_units: u64) -> Self {
        Self(Decimal::from(minor_units) / Decimal::ONE_HUNDRED)
    }

    /// Creates a zero amount
    pub fn zero() -> Self {
        Self::ZERO
    }

    /// Returns the underlying decimal value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        !self.0.is_zero()
    }

    /// Checked addition that reports overflow instead of panicking
    pub fn checked_add(&self, other: Amount) -> Result<Amount, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(MoneyError::Overflow)
    }

    /// Subtraction floored at zero
    ///
    /// Never produces a negative balance; a subtrahend larger than `self`
    /// yields zero.
    pub fn saturating_sub(&self, other: Amount) -> Amount {
        if other.0 >= self.0 {
            Amount::ZERO
        } else {
            Amount(self.0 - other.0)
        }
    }

    /// Rounds to cents using banker's rounding (round half to even)
    pub fn round_to_cents(&self) -> Self {
        Self(self.0.round_dp_with_strategy(
            DISPLAY_SCALE as u32,
            rust_decimal::RoundingStrategy::MidpointNearestEven,
        ))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Decimal {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| MoneyError::InvalidAmount(format!("{s}: {e}")))?;
        Amount::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.dp$}", self.0, dp = DISPLAY_SCALE)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.checked_add(other)
            .expect("Overflow in Amount::add")
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn add_then_saturating_sub_restores(
            base in 0u64..1_000_000_000u64,
            delta in 0u64..1_000_000_000u64
        ) {
            let a = Amount::from_minor(base);
            let d = Amount::from_minor(delta);

            prop_assert_eq!((a + d).saturating_sub(d), a);
        }

        #[test]
        fn saturating_sub_never_negative(
            a in 0u64..1_000_000u64,
            b in 0u64..1_000_000u64
        ) {
            let result = Amount::from_minor(a).saturating_sub(Amount::from_minor(b));
            prop_assert!(result.value() >= Decimal::ZERO);
        }
    }
}
