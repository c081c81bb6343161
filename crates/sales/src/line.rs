use serde::{Deserialize, Serialize};

use atelier_catalog::{BrandId, CategoryId, Product, ProductId, excl_from_incl};
use atelier_core::{DomainError, DomainResult, Money, Percentage};

/// The product facts an order line keeps for promotion targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub product_id: ProductId,
    pub category_id: CategoryId,
    pub brand_id: Option<BrandId>,
}

impl From<&Product> for ProductRef {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.id_typed(),
            category_id: product.category_id(),
            brand_id: product.brand_id(),
        }
    }
}

/// Order line with the price and tax rate captured when it was created.
///
/// Later catalog price changes never reach an existing line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product: ProductRef,
    pub quantity: u32,
    pub unit_price_incl_tax: Money,
    pub tax_rate: Percentage,
}

impl OrderLine {
    /// Snapshot the product's current retail price and tax rate.
    pub fn snapshot(product: &Product, quantity: u32) -> DomainResult<Self> {
        Self::priced(
            product,
            quantity,
            product.retail_price_incl_tax(),
            product.tax_rate(),
        )
    }

    /// Line at a negotiated price. Stock is still checked against the product.
    pub fn priced(
        product: &Product,
        quantity: u32,
        unit_price_incl_tax: Money,
        tax_rate: Percentage,
    ) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        product.ensure_available(quantity)?;
        Ok(Self {
            line_no: 0,
            product: ProductRef::from(product),
            quantity,
            unit_price_incl_tax: unit_price_incl_tax
                .ensure_non_negative("unit_price_incl_tax")?
                .round2(),
            tax_rate,
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product.product_id
    }

    pub fn total_incl_tax(&self) -> Money {
        self.unit_price_incl_tax.times(self.quantity).round2()
    }

    /// Rounded once per line, before any summation.
    pub fn total_excl_tax(&self) -> Money {
        excl_from_incl(self.total_incl_tax(), self.tax_rate)
    }

    pub fn tax_amount(&self) -> Money {
        self.total_incl_tax() - self.total_excl_tax()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_catalog::{TaxRate, recompute_price};
    use rust_decimal_macros::dec;

    fn priced_product(stock: u32) -> Product {
        let rate = TaxRate::new("VAT 20%", Percentage::new(dec!(20)).unwrap());
        let mut product = Product::new("Speaker", CategoryId::generate(), &rate).unwrap();
        product.set_price_incl_tax(Money::new(dec!(43.20))).unwrap();
        product.receive_stock(stock);
        recompute_price(&product, None).product
    }

    #[test]
    fn snapshot_captures_price_and_tax() {
        let product = priced_product(5);
        let line = OrderLine::snapshot(&product, 2).unwrap();

        assert_eq!(line.unit_price_incl_tax, Money::new(dec!(43.20)));
        assert_eq!(line.tax_rate.value(), dec!(20));
        assert_eq!(line.total_incl_tax(), Money::new(dec!(86.40)));
        assert_eq!(line.total_excl_tax(), Money::new(dec!(72.00)));
        assert_eq!(line.tax_amount(), Money::new(dec!(14.40)));
    }

    #[test]
    fn snapshot_is_insulated_from_later_price_changes() {
        let mut product = priced_product(5);
        let line = OrderLine::snapshot(&product, 1).unwrap();

        product.set_price_incl_tax(Money::new(dec!(99))).unwrap();
        let product = recompute_price(&product, None).product;
        assert_eq!(product.retail_price_incl_tax(), Money::new(dec!(99)));

        assert_eq!(line.unit_price_incl_tax, Money::new(dec!(43.20)));
    }

    #[test]
    fn rejects_quantity_above_stock() {
        let product = priced_product(1);
        let err = OrderLine::snapshot(&product, 2).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                requested: 2,
                available: 1
            }
        );
    }

    #[test]
    fn rejects_zero_quantity() {
        let product = priced_product(1);
        assert!(matches!(
            OrderLine::snapshot(&product, 0),
            Err(DomainError::Validation(_))
        ));
    }
}
