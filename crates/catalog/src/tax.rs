//! Tax rates and the exclusive/inclusive conversions built on them.

use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, Entity, Money, Percentage, domain_id, round2};

domain_id!(
    /// Tax rate identifier.
    TaxRateId
);

/// Tax-inclusive amount from a tax-exclusive one, rounded to the minor unit.
pub fn incl_from_excl(amount_excl_tax: Money, rate: Percentage) -> Money {
    Money::new(round2(amount_excl_tax.amount() * rate.multiplier()))
}

/// Tax-exclusive amount from a tax-inclusive one, rounded to the minor unit.
pub fn excl_from_incl(amount_incl_tax: Money, rate: Percentage) -> Money {
    Money::new(round2(amount_incl_tax.amount() / rate.multiplier()))
}

/// A named flat tax rate (e.g. "VAT 20%").
///
/// Rates referenced by settled orders are never removed, only deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate {
    pub id: TaxRateId,
    pub name: String,
    pub percentage: Percentage,
    pub is_default: bool,
    pub active: bool,
}

impl TaxRate {
    pub fn new(name: impl Into<String>, percentage: Percentage) -> Self {
        Self {
            id: TaxRateId::generate(),
            name: name.into(),
            percentage,
            is_default: false,
            active: true,
        }
    }
}

impl Entity for TaxRate {
    type Id = TaxRateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Registry of tax rates keeping the single-active-default rule.
#[derive(Debug, Clone, Default)]
pub struct TaxRateBook {
    rates: Vec<TaxRate>,
}

impl TaxRateBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rate. A rate flagged default takes the default over.
    pub fn register(&mut self, rate: TaxRate) -> DomainResult<()> {
        if rate.name.trim().is_empty() {
            return Err(DomainError::validation("tax rate name cannot be empty"));
        }
        if self.rates.iter().any(|r| r.id == rate.id) {
            return Err(DomainError::conflict("tax rate already registered"));
        }
        let makes_default = rate.is_default && rate.active;
        self.rates.push(rate);
        if makes_default {
            let id = self.rates[self.rates.len() - 1].id;
            self.set_default(id)?;
        }
        Ok(())
    }

    pub fn get(&self, id: TaxRateId) -> Option<&TaxRate> {
        self.rates.iter().find(|r| r.id == id)
    }

    /// The active default rate, if any.
    pub fn default_rate(&self) -> Option<&TaxRate> {
        self.rates.iter().find(|r| r.is_default && r.active)
    }

    pub fn set_default(&mut self, id: TaxRateId) -> DomainResult<()> {
        let target = self.get(id).ok_or(DomainError::NotFound)?;
        if !target.active {
            return Err(DomainError::invariant("inactive tax rate cannot be the default"));
        }
        for rate in &mut self.rates {
            rate.is_default = rate.id == id;
        }
        Ok(())
    }

    /// Retire a rate. It stays resolvable for historical lines.
    pub fn deactivate(&mut self, id: TaxRateId) -> DomainResult<()> {
        let rate = self
            .rates
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(DomainError::NotFound)?;
        rate.active = false;
        rate.is_default = false;
        Ok(())
    }

    pub fn active(&self) -> impl Iterator<Item = &TaxRate> {
        self.rates.iter().filter(|r| r.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn pct(value: Decimal) -> Percentage {
        Percentage::new(value).unwrap()
    }

    #[test]
    fn incl_from_excl_applies_rate() {
        assert_eq!(incl_from_excl(Money::new(dec!(12.50)), pct(dec!(20))), Money::new(dec!(15.00)));
        assert_eq!(incl_from_excl(Money::new(dec!(36.00)), pct(dec!(20))), Money::new(dec!(43.20)));
        assert_eq!(incl_from_excl(Money::new(dec!(10)), pct(dec!(5.5))), Money::new(dec!(10.55)));
    }

    #[test]
    fn excl_from_incl_rounds_half_up() {
        assert_eq!(excl_from_incl(Money::new(dec!(86.40)), pct(dec!(20))), Money::new(dec!(72.00)));
        // 10.01 / 1.2 = 8.341666.. -> 8.34
        assert_eq!(excl_from_incl(Money::new(dec!(10.01)), pct(dec!(20))), Money::new(dec!(8.34)));
        // 0.105 at 0% -> 0.11 (half up)
        assert_eq!(excl_from_incl(Money::new(dec!(0.105)), Percentage::ZERO), Money::new(dec!(0.11)));
    }

    #[test]
    fn zero_rate_is_identity_on_cents() {
        let amount = Money::new(dec!(19.99));
        assert_eq!(incl_from_excl(amount, Percentage::ZERO), amount);
        assert_eq!(excl_from_incl(amount, Percentage::ZERO), amount);
    }

    #[test]
    fn book_keeps_a_single_default() {
        let mut book = TaxRateBook::new();
        let mut standard = TaxRate::new("VAT 20%", pct(dec!(20)));
        standard.is_default = true;
        let mut reduced = TaxRate::new("VAT 5.5%", pct(dec!(5.5)));
        reduced.is_default = true;
        let standard_id = standard.id;
        let reduced_id = reduced.id;

        book.register(standard).unwrap();
        book.register(reduced).unwrap();

        assert_eq!(book.default_rate().map(|r| r.id), Some(reduced_id));
        assert!(!book.get(standard_id).unwrap().is_default);

        book.set_default(standard_id).unwrap();
        assert_eq!(book.default_rate().map(|r| r.id), Some(standard_id));
    }

    #[test]
    fn deactivated_rate_stays_resolvable() {
        let mut book = TaxRateBook::new();
        let mut rate = TaxRate::new("VAT 20%", pct(dec!(20)));
        rate.is_default = true;
        let id = rate.id;
        book.register(rate).unwrap();

        book.deactivate(id).unwrap();

        assert!(book.get(id).is_some());
        assert!(book.default_rate().is_none());
        assert_eq!(book.active().count(), 0);
        assert!(matches!(book.set_default(id), Err(DomainError::InvariantViolation(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: converting to inclusive and back lands within one cent.
        #[test]
        fn round_trip_within_one_cent(cents in 0i64..10_000_000, rate_hundredths in 0i64..10_000) {
            let amount = Money::new(Decimal::new(cents, 2));
            let rate = pct(Decimal::new(rate_hundredths, 2));

            let back = excl_from_incl(incl_from_excl(amount, rate), rate);
            let drift = (back.amount() - amount.amount()).abs();

            prop_assert!(drift <= dec!(0.01), "drift {} for {} at {}", drift, amount, rate);
        }
    }
}
