use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, Money, domain_id};

use crate::product::ProductId;

domain_id!(
    /// Supplier identifier.
    SupplierId
);

/// A supplier's purchase quote (tax-exclusive) for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierPrice {
    pub product_id: ProductId,
    pub supplier_id: SupplierId,
    pub price: Money,
    pub lead_time_days: u32,
    pub is_preferred: bool,
}

impl SupplierPrice {
    pub fn new(product_id: ProductId, supplier_id: SupplierId, price: Money) -> DomainResult<Self> {
        Ok(Self {
            product_id,
            supplier_id,
            price: price.ensure_non_negative("supplier price")?,
            lead_time_days: 0,
            is_preferred: false,
        })
    }

    pub fn preferred(mut self) -> Self {
        self.is_preferred = true;
        self
    }
}

/// Purchase quotes of every supplier for a single product.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupplierPriceList {
    quotes: Vec<SupplierPrice>,
}

impl SupplierPriceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quotes(&self) -> &[SupplierPrice] {
        &self.quotes
    }

    /// Add or replace a supplier's quote.
    ///
    /// One quote per supplier; marking a quote preferred demotes the others.
    pub fn upsert(&mut self, quote: SupplierPrice) -> DomainResult<()> {
        if let Some(first) = self.quotes.first() {
            if first.product_id != quote.product_id {
                return Err(DomainError::invariant("quote belongs to another product"));
            }
        }
        if quote.is_preferred {
            for existing in &mut self.quotes {
                existing.is_preferred = false;
            }
        }
        match self
            .quotes
            .iter_mut()
            .find(|q| q.supplier_id == quote.supplier_id)
        {
            Some(existing) => *existing = quote,
            None => self.quotes.push(quote),
        }
        Ok(())
    }

    /// Cost basis for pricing: the preferred quote, else the first one recorded.
    pub fn preferred(&self) -> Option<&SupplierPrice> {
        self.quotes
            .iter()
            .find(|q| q.is_preferred)
            .or_else(|| self.quotes.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn preferred_quote_wins_over_insertion_order() {
        let product = ProductId::generate();
        let mut list = SupplierPriceList::new();
        list.upsert(SupplierPrice::new(product, SupplierId::generate(), Money::new(dec!(22))).unwrap())
            .unwrap();
        let preferred = SupplierPrice::new(product, SupplierId::generate(), Money::new(dec!(20)))
            .unwrap()
            .preferred();
        list.upsert(preferred).unwrap();

        assert_eq!(list.preferred().map(|q| q.price), Some(Money::new(dec!(20))));
    }

    #[test]
    fn falls_back_to_first_quote() {
        let product = ProductId::generate();
        let mut list = SupplierPriceList::new();
        assert!(list.preferred().is_none());

        list.upsert(SupplierPrice::new(product, SupplierId::generate(), Money::new(dec!(9))).unwrap())
            .unwrap();
        list.upsert(SupplierPrice::new(product, SupplierId::generate(), Money::new(dec!(7))).unwrap())
            .unwrap();

        assert_eq!(list.preferred().map(|q| q.price), Some(Money::new(dec!(9))));
    }

    #[test]
    fn one_quote_per_supplier_and_single_preferred() {
        let product = ProductId::generate();
        let supplier = SupplierId::generate();
        let mut list = SupplierPriceList::new();
        list.upsert(SupplierPrice::new(product, supplier, Money::new(dec!(9))).unwrap().preferred())
            .unwrap();
        list.upsert(SupplierPrice::new(product, supplier, Money::new(dec!(8))).unwrap())
            .unwrap();
        list.upsert(
            SupplierPrice::new(product, SupplierId::generate(), Money::new(dec!(10)))
                .unwrap()
                .preferred(),
        )
        .unwrap();

        assert_eq!(list.quotes().len(), 2);
        assert_eq!(list.quotes().iter().filter(|q| q.is_preferred).count(), 1);
        assert_eq!(list.preferred().map(|q| q.price), Some(Money::new(dec!(10))));
    }

    #[test]
    fn rejects_quote_for_other_product() {
        let mut list = SupplierPriceList::new();
        list.upsert(
            SupplierPrice::new(ProductId::generate(), SupplierId::generate(), Money::new(dec!(1)))
                .unwrap(),
        )
        .unwrap();
        let stray = SupplierPrice::new(ProductId::generate(), SupplierId::generate(), Money::new(dec!(1)))
            .unwrap();
        assert!(list.upsert(stray).is_err());
    }
}
