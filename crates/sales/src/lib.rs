//! Sales domain: customers, carriers, promotions, credit notes and orders.
//!
//! Deterministic domain logic only (no IO, no storage). The order aggregate is
//! event-sourced; totals and stock reactions are pure functions over it.

pub mod carrier;
pub mod credit_note;
pub mod fulfillment;
pub mod line;
pub mod order;
pub mod party;
pub mod promotion;
pub mod reference;
pub mod totals;

pub use carrier::{Carrier, CarrierId};
pub use credit_note::{CreditNote, CreditNoteId};
pub use fulfillment::{StatusTransition, StockDelta, stock_deltas, transition};
pub use line::{OrderLine, ProductRef};
pub use order::{
    AddLine, AddressesChanged, ApplyPromotionCode, AssignReference, AttachCreditNote,
    ChangeAddresses, ChangeStatus, CreateOrder, CreditNoteAttached, CreditNoteSpent,
    DiscountRecorded, LineAdded, Order, OrderCommand, OrderCreated, OrderEvent, OrderId,
    OrderStatus, PromotionApplied, RecordDiscount, ReferenceAssigned, SetShipping,
    SettledDiscounts, Shipping, ShippingSet, SpendCreditNote, StatusChanged,
};
pub use party::{Address, AddressId, AddressKind, Customer, CustomerId, validate_order_addresses};
pub use promotion::{
    Discount, LineDiscount, Promotion, PromotionBook, PromotionId, PromotionKind, PromotionRule,
    RuleTarget, TargetKind, automatic_line_discounts, coded_discount,
};
pub use reference::ReferenceGenerator;
pub use totals::{OrderTotals, PricingContext, TotalsBreakdown, compute_totals};
