use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, Entity, Money, Percentage, domain_id};
use rust_decimal::Decimal;

use crate::tax::{TaxRate, TaxRateId};

domain_id!(
    /// Product identifier.
    ProductId
);
domain_id!(
    /// Product category identifier.
    CategoryId
);
domain_id!(
    /// Brand identifier.
    BrandId
);

/// Margin applied to new products when merchandising does not set one.
pub const DEFAULT_MARGIN_COEFFICIENT: Decimal = Decimal::from_parts(150, 0, 0, false, 2);

/// Stock level at or below which a product is flagged for reorder.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

/// Catalog product with its retail pricing and on-hand stock.
///
/// Prices are kept in sync by [`crate::recompute_price`]; the setters here only
/// record which side the caller wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    category_id: CategoryId,
    brand_id: Option<BrandId>,
    tax_rate_id: TaxRateId,
    tax_rate: Percentage,
    pub(crate) purchase_cost: Option<Money>,
    margin_coefficient: Decimal,
    pub(crate) retail_price_excl_tax: Money,
    pub(crate) retail_price_incl_tax: Money,
    stock_quantity: i64,
    low_stock_threshold: i64,
}

impl Product {
    /// New unpriced product with no stock.
    pub fn new(
        name: impl Into<String>,
        category_id: CategoryId,
        tax_rate: &TaxRate,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(Self {
            id: ProductId::generate(),
            name,
            category_id,
            brand_id: None,
            tax_rate_id: tax_rate.id,
            tax_rate: tax_rate.percentage,
            purchase_cost: None,
            margin_coefficient: DEFAULT_MARGIN_COEFFICIENT,
            retail_price_excl_tax: Money::ZERO,
            retail_price_incl_tax: Money::ZERO,
            stock_quantity: 0,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        })
    }

    pub fn with_brand(mut self, brand_id: BrandId) -> Self {
        self.brand_id = Some(brand_id);
        self
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category_id(&self) -> CategoryId {
        self.category_id
    }

    pub fn brand_id(&self) -> Option<BrandId> {
        self.brand_id
    }

    pub fn tax_rate_id(&self) -> TaxRateId {
        self.tax_rate_id
    }

    pub fn tax_rate(&self) -> Percentage {
        self.tax_rate
    }

    pub fn purchase_cost(&self) -> Option<Money> {
        self.purchase_cost
    }

    pub fn margin_coefficient(&self) -> Decimal {
        self.margin_coefficient
    }

    pub fn retail_price_excl_tax(&self) -> Money {
        self.retail_price_excl_tax
    }

    pub fn retail_price_incl_tax(&self) -> Money {
        self.retail_price_incl_tax
    }

    pub fn stock_quantity(&self) -> i64 {
        self.stock_quantity
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock_quantity > 0
    }

    pub fn needs_reorder(&self) -> bool {
        self.stock_quantity <= self.low_stock_threshold
    }

    /// Both prices still zero: nothing to sell at yet.
    pub fn is_unpriced(&self) -> bool {
        self.retail_price_excl_tax.is_zero() && self.retail_price_incl_tax.is_zero()
    }

    pub fn set_margin_coefficient(&mut self, coefficient: Decimal) -> DomainResult<()> {
        if coefficient <= Decimal::ZERO {
            return Err(DomainError::validation("margin coefficient must be positive"));
        }
        self.margin_coefficient = coefficient;
        Ok(())
    }

    pub fn set_low_stock_threshold(&mut self, threshold: i64) -> DomainResult<()> {
        if threshold < 0 {
            return Err(DomainError::validation("low stock threshold cannot be negative"));
        }
        self.low_stock_threshold = threshold;
        Ok(())
    }

    /// Write the tax-exclusive price; the inclusive side is re-derived on recompute.
    pub fn set_price_excl_tax(&mut self, price: Money) -> DomainResult<()> {
        self.retail_price_excl_tax = price.ensure_non_negative("retail_price_excl_tax")?;
        self.retail_price_incl_tax = Money::ZERO;
        Ok(())
    }

    /// Write the tax-inclusive price; the exclusive side is re-derived on recompute.
    pub fn set_price_incl_tax(&mut self, price: Money) -> DomainResult<()> {
        self.retail_price_incl_tax = price.ensure_non_negative("retail_price_incl_tax")?;
        self.retail_price_excl_tax = Money::ZERO;
        Ok(())
    }

    /// Drop both prices so the next recompute prices from supplier cost.
    pub fn clear_prices(&mut self) {
        self.retail_price_excl_tax = Money::ZERO;
        self.retail_price_incl_tax = Money::ZERO;
    }

    /// Point the product at another tax rate. The exclusive price stays authoritative.
    pub fn change_tax_rate(&mut self, rate: &TaxRate) {
        self.tax_rate_id = rate.id;
        self.tax_rate = rate.percentage;
    }

    /// Receive goods (stock-in from procurement or inventory count).
    pub fn receive_stock(&mut self, quantity: u32) {
        self.stock_quantity += i64::from(quantity);
    }

    /// Apply a signed stock movement. Shipment deltas may take stock below zero.
    pub fn apply_stock_delta(&mut self, delta: i64) {
        self.stock_quantity += delta;
    }

    /// Check that `quantity` units can be promised on a new order line.
    pub fn ensure_available(&self, quantity: u32) -> DomainResult<()> {
        if i64::from(quantity) > self.stock_quantity {
            return Err(DomainError::InsufficientStock {
                requested: quantity,
                available: self.stock_quantity,
            });
        }
        Ok(())
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
