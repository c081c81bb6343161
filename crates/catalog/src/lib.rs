//! Catalog pricing: tax conversions, products, supplier costs and retail price
//! derivation.
//!
//! Pure domain logic (no IO, no HTTP, no storage).

pub mod pricer;
pub mod product;
pub mod supplier;
pub mod tax;

pub use pricer::{PriceSource, PricingOutcome, PricingReview, recompute_price};
pub use product::{BrandId, CategoryId, Product, ProductId};
pub use supplier::{SupplierId, SupplierPrice, SupplierPriceList};
pub use tax::{TaxRate, TaxRateBook, TaxRateId, excl_from_incl, incl_from_excl};
