use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

pub const BASIS_POINTS_DENOMINATOR: i64 = 10_000;

//--------------------------------------    CommissionRate    --------------------------------------------------------
/// The platform's cut of an order, expressed in basis points. A valid rate lies in `[0, 10_000)`, i.e. the platform
/// always takes strictly less than the full order value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRate(i64);

#[derive(Debug, Clone, Error)]
#[error("Commission rate must lie in [0, 1). {0} basis points is out of range")]
pub struct InvalidRateError(i64);

impl CommissionRate {
    pub fn from_basis_points(bps: i64) -> Result<Self, InvalidRateError> {
        if (0..BASIS_POINTS_DENOMINATOR).contains(&bps) {
            Ok(Self(bps))
        } else {
            Err(InvalidRateError(bps))
        }
    }

    pub fn basis_points(&self) -> i64 {
        self.0
    }
}

//--------------------------------------    CommissionSplit   --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub platform_fee: Money,
    pub seller_net: Money,
}

/// Split an order total into the platform fee and the seller's net proceeds.
///
/// The fee is `price * rate` rounded half-up to the minor currency unit, and the seller net is the exact remainder,
/// so `platform_fee + seller_net == price` always holds.
pub fn split(price: Money, rate: CommissionRate) -> CommissionSplit {
    let scaled = price.value() * rate.basis_points() + BASIS_POINTS_DENOMINATOR / 2;
    let platform_fee = Money::from(scaled.div_euclid(BASIS_POINTS_DENOMINATOR));
    CommissionSplit { platform_fee, seller_net: price - platform_fee }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn five_percent_of_one_hundred() {
        let rate = CommissionRate::from_basis_points(500).unwrap();
        let result = split(Money::from_units(100), rate);
        assert_eq!(result.platform_fee, Money::from_units(5));
        assert_eq!(result.seller_net, Money::from_units(95));
    }

    #[test]
    fn fee_rounds_half_up() {
        // 2.5% of 0.99 is 2.475 cents, which rounds up to 3 cents
        let rate = CommissionRate::from_basis_points(250).unwrap();
        let result = split(Money::from(99), rate);
        assert_eq!(result.platform_fee, Money::from(3));
        assert_eq!(result.seller_net, Money::from(96));
        // 2.5% of 0.96 is 2.4 cents, which rounds down to 2 cents
        let result = split(Money::from(96), rate);
        assert_eq!(result.platform_fee, Money::from(2));
        assert_eq!(result.seller_net, Money::from(94));
    }

    #[test]
    fn split_never_leaks_a_cent() {
        for bps in [0, 1, 250, 500, 1_500, 3_333, 9_999] {
            let rate = CommissionRate::from_basis_points(bps).unwrap();
            for cents in 0..2_500 {
                let price = Money::from(cents);
                let result = split(price, rate);
                assert_eq!(result.platform_fee + result.seller_net, price, "leaked at {cents} cents, {bps} bps");
                assert!(!result.platform_fee.is_negative());
                assert!(!result.seller_net.is_negative());
            }
        }
    }

    #[test]
    fn out_of_range_rates_are_rejected() {
        assert!(CommissionRate::from_basis_points(-1).is_err());
        assert!(CommissionRate::from_basis_points(10_000).is_err());
        assert!(CommissionRate::from_basis_points(10_500).is_err());
        assert!(CommissionRate::from_basis_points(0).is_ok());
        assert!(CommissionRate::from_basis_points(9_999).is_ok());
    }

    #[test]
    fn zero_rate_takes_nothing() {
        let rate = CommissionRate::from_basis_points(0).unwrap();
        let result = split(Money::from_units(42), rate);
        assert_eq!(result.platform_fee, Money::from(0));
        assert_eq!(result.seller_net, Money::from_units(42));
    }
}
