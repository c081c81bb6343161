//! Retail price derivation.
//!
//! Called explicitly by the catalog layer on product create, supplier-price
//! change and tax-rate change. Idempotent: recomputing an already synced product
//! yields the same prices.

use serde::{Deserialize, Serialize};

use atelier_core::Money;

use crate::product::Product;
use crate::supplier::SupplierPrice;
use crate::tax::{excl_from_incl, incl_from_excl};

/// Which input the retail prices were derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Exclusive price was authoritative; inclusive re-derived.
    ExclusivePrice,
    /// Inclusive price was supplied; exclusive back-derived.
    InclusivePrice,
    /// Priced from preferred supplier cost and margin.
    SupplierCost,
    /// Nothing to derive from; prices left as they were.
    Unpriced,
}

/// Why a product should be looked at by merchandising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingReview {
    /// Neither a cost basis nor an explicit price: priced at zero pending cost data.
    AmbiguousPricingInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingOutcome {
    pub product: Product,
    pub source: PriceSource,
    pub review: Option<PricingReview>,
}

impl PricingOutcome {
    pub fn needs_review(&self) -> bool {
        self.review.is_some()
    }
}

/// Derive a product's retail prices.
///
/// Precedence: non-zero exclusive price, then non-zero inclusive price, then
/// `cost * margin` taxed as an exclusive amount. The preferred supplier quote
/// also refreshes the product's purchase cost.
pub fn recompute_price(product: &Product, preferred: Option<&SupplierPrice>) -> PricingOutcome {
    let mut next = product.clone();
    let rate = next.tax_rate();

    if let Some(quote) = preferred {
        next.purchase_cost = Some(quote.price);
    }

    let source = if !next.retail_price_excl_tax.is_zero() {
        next.retail_price_incl_tax = incl_from_excl(next.retail_price_excl_tax, rate);
        PriceSource::ExclusivePrice
    } else if !next.retail_price_incl_tax.is_zero() {
        next.retail_price_incl_tax = next.retail_price_incl_tax.round2();
        next.retail_price_excl_tax = excl_from_incl(next.retail_price_incl_tax, rate);
        PriceSource::InclusivePrice
    } else if let Some(quote) = preferred {
        let margin_applied = Money::new(quote.price.amount() * next.margin_coefficient());
        next.retail_price_incl_tax = incl_from_excl(margin_applied, rate);
        next.retail_price_excl_tax = excl_from_incl(next.retail_price_incl_tax, rate);
        PriceSource::SupplierCost
    } else {
        PriceSource::Unpriced
    };

    let review = (source == PriceSource::Unpriced).then_some(PricingReview::AmbiguousPricingInput);

    match source {
        PriceSource::Unpriced => tracing::warn!(
            product_id = %next.id_typed(),
            "product has no cost basis and no explicit price; left at zero"
        ),
        _ => tracing::debug!(
            product_id = %next.id_typed(),
            ?source,
            excl = %next.retail_price_excl_tax,
            incl = %next.retail_price_incl_tax,
            "retail price recomputed"
        ),
    }

    PricingOutcome {
        product: next,
        source,
        review,
    }
}
