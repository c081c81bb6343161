//! Reference data and the per-order unit of work.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use atelier_catalog::{Product, ProductId, SupplierPriceList, TaxRateBook};
use atelier_core::{Aggregate, AggregateRoot, EngineConfig, Entity};
use atelier_events::execute;
use atelier_sales::{
    Address, AddressId, Carrier, CarrierId, CreditNote, CreditNoteId, Customer, CustomerId, Order,
    OrderCommand, OrderEvent, OrderTotals, PricingContext, Promotion, PromotionBook,
    ReferenceGenerator, StatusTransition, compute_totals,
};

use crate::error::{SettlementError, SettlementResult};

/// Everything except order streams.
#[derive(Debug)]
pub(crate) struct Ledger {
    pub(crate) tax_rates: TaxRateBook,
    pub(crate) products: BTreeMap<ProductId, Product>,
    pub(crate) supplier_prices: BTreeMap<ProductId, SupplierPriceList>,
    pub(crate) customers: BTreeMap<CustomerId, Customer>,
    pub(crate) addresses: BTreeMap<AddressId, Address>,
    pub(crate) carriers: BTreeMap<CarrierId, Carrier>,
    pub(crate) promotions: PromotionBook,
    pub(crate) credit_notes: BTreeMap<CreditNoteId, CreditNote>,
    pub(crate) references: ReferenceGenerator,
}

impl Ledger {
    pub(crate) fn new(config: &EngineConfig) -> Self {
        Self {
            tax_rates: TaxRateBook::new(),
            products: BTreeMap::new(),
            supplier_prices: BTreeMap::new(),
            customers: BTreeMap::new(),
            addresses: BTreeMap::new(),
            carriers: BTreeMap::new(),
            promotions: PromotionBook::new(),
            credit_notes: BTreeMap::new(),
            references: ReferenceGenerator::new(config.order_reference_prefix.clone()),
        }
    }

    pub(crate) fn product(&self, id: ProductId) -> SettlementResult<&Product> {
        self.products
            .get(&id)
            .ok_or_else(|| SettlementError::not_found("product", id))
    }

    pub(crate) fn address(&self, id: AddressId) -> SettlementResult<&Address> {
        self.addresses
            .get(&id)
            .ok_or_else(|| SettlementError::not_found("address", id))
    }

    pub(crate) fn carrier(&self, id: CarrierId) -> SettlementResult<&Carrier> {
        self.carriers
            .get(&id)
            .ok_or_else(|| SettlementError::not_found("carrier", id))
    }

    pub(crate) fn credit_note_by_code(&self, code: &str) -> SettlementResult<&CreditNote> {
        let wanted = code.trim().to_uppercase();
        self.credit_notes
            .values()
            .find(|n| n.code == wanted)
            .ok_or_else(|| SettlementError::not_found("credit note", code))
    }

    pub(crate) fn commit(&mut self, staged: Staged) {
        self.products.extend(staged.products);
        self.credit_notes.extend(staged.credit_notes);
        if let Some(references) = staged.references {
            self.references = references;
        }
    }
}

/// Insert or replace a record under its own id.
pub(crate) fn store<E: Entity>(records: &mut BTreeMap<E::Id, E>, record: E) -> Option<E> {
    records.insert(record.key(), record)
}

/// Changes made by one unit of work, applied to the ledger only on success.
#[derive(Debug, Default)]
pub(crate) struct Staged {
    products: BTreeMap<ProductId, Product>,
    credit_notes: BTreeMap<CreditNoteId, CreditNote>,
    references: Option<ReferenceGenerator>,
}

/// Working copy of one order and everything it touches.
///
/// Reads fall through to the ledger; writes stay local until commit. Dropping
/// the unit of work discards every change.
pub(crate) struct UnitOfWork<'a> {
    ledger: &'a Ledger,
    order: Order,
    loaded_version: u64,
    pending: Vec<OrderEvent>,
    staged: Staged,
}

impl<'a> UnitOfWork<'a> {
    pub(crate) fn new(ledger: &'a Ledger, order: Order) -> Self {
        let loaded_version = order.version();
        Self {
            ledger,
            order,
            loaded_version,
            pending: Vec::new(),
            staged: Staged::default(),
        }
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn execute(&mut self, command: OrderCommand) -> SettlementResult<Vec<OrderEvent>> {
        let events = execute(&mut self.order, &command)?;
        self.pending.extend(events.iter().cloned());
        Ok(events)
    }

    /// Adopt a status transition and stage its stock movements.
    pub fn record_transition(&mut self, transition: StatusTransition) -> SettlementResult<()> {
        for delta in &transition.stock_deltas {
            let product = self.product_mut(delta.product_id)?;
            product.apply_stock_delta(delta.delta);
            tracing::debug!(
                product_id = %delta.product_id,
                delta = delta.delta,
                stock = product.stock_quantity(),
                "stock movement staged"
            );
        }
        self.pending.extend(transition.events);
        self.order = transition.order;
        Ok(())
    }

    pub fn customer_exists(&self, id: CustomerId) -> bool {
        self.ledger.customers.contains_key(&id)
    }

    pub fn address(&self, id: AddressId) -> SettlementResult<&Address> {
        self.ledger.address(id)
    }

    pub fn carrier(&self, id: CarrierId) -> SettlementResult<&Carrier> {
        self.ledger.carrier(id)
    }

    pub fn promotion_by_code(&self, code: &str) -> Option<Promotion> {
        self.ledger.promotions.find_by_code(code).cloned()
    }

    pub fn product(&self, id: ProductId) -> SettlementResult<&Product> {
        match self.staged.products.get(&id) {
            Some(product) => Ok(product),
            None => self.ledger.product(id),
        }
    }

    pub fn product_mut(&mut self, id: ProductId) -> SettlementResult<&mut Product> {
        if !self.staged.products.contains_key(&id) {
            let current = self.ledger.product(id)?.clone();
            self.staged.products.insert(id, current);
        }
        self.staged
            .products
            .get_mut(&id)
            .ok_or_else(|| SettlementError::not_found("product", id))
    }

    pub fn credit_note(&self, id: CreditNoteId) -> Option<&CreditNote> {
        self.staged
            .credit_notes
            .get(&id)
            .or_else(|| self.ledger.credit_notes.get(&id))
    }

    pub fn credit_note_by_code(&self, code: &str) -> SettlementResult<CreditNote> {
        let note = self.ledger.credit_note_by_code(code)?;
        Ok(self.credit_note(note.id).unwrap_or(note).clone())
    }

    pub fn credit_note_mut(&mut self, id: CreditNoteId) -> SettlementResult<&mut CreditNote> {
        if !self.staged.credit_notes.contains_key(&id) {
            let current = self
                .ledger
                .credit_notes
                .get(&id)
                .cloned()
                .ok_or_else(|| SettlementError::not_found("credit note", id))?;
            self.staged.credit_notes.insert(id, current);
        }
        self.staged
            .credit_notes
            .get_mut(&id)
            .ok_or_else(|| SettlementError::not_found("credit note", id))
    }

    pub fn insert_credit_note(&mut self, note: CreditNote) {
        store(&mut self.staged.credit_notes, note);
    }

    pub fn next_reference(&mut self, at: DateTime<Utc>) -> String {
        let ledger = self.ledger;
        self.staged
            .references
            .get_or_insert_with(|| ledger.references.clone())
            .next(at)
    }

    /// Totals of the working order, seeing staged credit notes.
    pub fn totals(&self, config: &EngineConfig, now: DateTime<Utc>) -> OrderTotals {
        let credit_note = self
            .order
            .applied_credit_note()
            .and_then(|id| self.credit_note(id));
        compute_totals(
            &self.order,
            &PricingContext {
                promotions: self.ledger.promotions.all(),
                credit_note,
                now,
                default_shipping_tax_rate: config.default_shipping_tax_rate,
            },
        )
    }

    pub(crate) fn into_parts(self) -> (Order, u64, Vec<OrderEvent>, Staged) {
        (self.order, self.loaded_version, self.pending, self.staged)
    }
}

/// Replay an order stream.
pub(crate) fn rehydrate(order: &mut Order, events: &[OrderEvent]) {
    for event in events {
        order.apply(event);
    }
}
