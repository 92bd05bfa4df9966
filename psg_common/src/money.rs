use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "usd";

//--------------------------------------       Money       -----------------------------------------------------------
/// A monetary amount in minor currency units (cents). All arithmetic is integer arithmetic, so amounts never
/// accumulate floating-point drift.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor currency units: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to Money", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", cents / 100, cents % 100)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Construct an amount from whole currency units, e.g. `Money::from_units(12)` is 12.00.
    pub fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

#[cfg(test)]
mod test {
    use super::Money;

    #[test]
    fn arithmetic_is_exact() {
        let a = Money::from(1_050);
        let b = Money::from(999);
        assert_eq!((a + b).value(), 2_049);
        assert_eq!((a - b).value(), 51);
        assert_eq!((-b).value(), -999);
        assert_eq!((a * 3).value(), 3_150);
        let total: Money = [a, b, Money::from(1)].into_iter().sum();
        assert_eq!(total.value(), 2_050);
    }

    #[test]
    fn display_formats_minor_units() {
        assert_eq!(Money::from(10_000).to_string(), "100.00");
        assert_eq!(Money::from(501).to_string(), "5.01");
        assert_eq!(Money::from(-50).to_string(), "-0.50");
        assert_eq!(Money::from(0).to_string(), "0.00");
    }

    #[test]
    fn from_units() {
        assert_eq!(Money::from_units(95), Money::from(9_500));
    }
}
