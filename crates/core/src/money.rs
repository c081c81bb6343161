//! Fixed-point monetary amounts and tax/discount percentages.
//!
//! All arithmetic runs on [`rust_decimal::Decimal`]. Derived amounts are rounded
//! to the currency minor unit (2 places, half-up) where they are stored.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Currency minor-unit precision.
pub const MONEY_SCALE: u32 = 2;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Round to the currency minor unit, half away from zero.
#[inline]
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Amount in the single operating currency.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Wrap a raw amount without rounding (intermediate values).
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Wrap and round to the minor unit.
    pub fn rounded(amount: Decimal) -> Self {
        Self(round2(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn round2(self) -> Self {
        Self::rounded(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Multiply by a unit count (no rounding needed for 2-place inputs).
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Clamp below at zero.
    pub fn non_negative(self) -> Self {
        if self.is_negative() { Self::ZERO } else { self }
    }

    /// Fraction of this amount for a percentage, rounded to the minor unit.
    pub fn percent_of(self, pct: Percentage) -> Self {
        Self::rounded(self.0 * pct.fraction())
    }

    /// Validate that a caller-supplied amount is not negative.
    pub fn ensure_non_negative(self, field: &str) -> DomainResult<Self> {
        if self.is_negative() {
            return Err(DomainError::validation(format!("{field} cannot be negative")));
        }
        Ok(self)
    }
}

impl ValueObject for Money {}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

/// Non-negative percentage (e.g. `20` for a 20% tax rate).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation("percentage cannot be negative"));
        }
        Ok(Self(value))
    }

    /// Whole-number percentage; never negative.
    pub fn whole(value: u32) -> Self {
        Self(Decimal::from(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// `value / 100`.
    pub fn fraction(&self) -> Decimal {
        self.0 / HUNDRED
    }

    /// `1 + value / 100`.
    pub fn multiplier(&self) -> Decimal {
        Decimal::ONE + self.fraction()
    }
}

impl ValueObject for Percentage {}

impl TryFrom<Decimal> for Percentage {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Percentage::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(value: Percentage) -> Self {
        value.0
    }
}

impl core::fmt::Display for Percentage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round2_is_half_up_not_bankers() {
        assert_eq!(round2(dec!(10.005)), dec!(10.01));
        assert_eq!(round2(dec!(0.125)), dec!(0.13));
        assert_eq!(round2(dec!(0.135)), dec!(0.14));
        assert_eq!(round2(dec!(2.344)), dec!(2.34));
    }

    #[test]
    fn percentage_rejects_negative_values() {
        assert!(Percentage::new(dec!(-1)).is_err());
        assert!(Percentage::new(dec!(0)).is_ok());
    }

    #[test]
    fn percent_of_rounds_result() {
        let pct = Percentage::new(dec!(20)).unwrap();
        assert_eq!(Money::new(dec!(86.40)).percent_of(pct), Money::new(dec!(17.28)));
        assert_eq!(Money::new(dec!(0.05)).percent_of(pct), Money::new(dec!(0.01)));
    }

    #[test]
    fn non_negative_clamps_at_zero() {
        assert_eq!(Money::new(dec!(-3.10)).non_negative(), Money::ZERO);
        assert_eq!(Money::new(dec!(3.10)).non_negative(), Money::new(dec!(3.10)));
    }

    #[test]
    fn sum_adds_all_amounts() {
        let amounts = [Money::new(dec!(1.10)), Money::new(dec!(2.20)), Money::new(dec!(3.30))];
        let total: Money = amounts.iter().sum();
        assert_eq!(total, Money::new(dec!(6.60)));
    }

    #[test]
    fn display_uses_two_places() {
        assert_eq!(Money::new(dec!(43.2)).to_string(), "43.20");
        assert_eq!(Percentage::new(dec!(20.00)).unwrap().to_string(), "20%");
    }

    #[test]
    fn percentage_deserialization_enforces_sign() {
        let ok: Percentage = serde_json::from_str("\"5.5\"").unwrap();
        assert_eq!(ok.value(), dec!(5.5));
        assert!(serde_json::from_str::<Percentage>("\"-5\"").is_err());
    }
}
