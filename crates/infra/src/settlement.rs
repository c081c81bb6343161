//! Settlement service: catalog writes, order workflow and the order unit of work.
//!
//! Writers serialize on one ledger lock, so a status change, the credit note it
//! spends and the stock it moves commit together or not at all. Reads replay the
//! order stream and never mutate anything.

use std::sync::{RwLock, RwLockReadGuard};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use atelier_catalog::{
    PricingOutcome, Product, ProductId, SupplierPrice, SupplierPriceList, TaxRate, TaxRateId,
    recompute_price,
};
use atelier_core::{AggregateRoot, DomainError, EngineConfig, ExpectedVersion, Money, Percentage};
use atelier_sales::{
    AddLine, Address, AddressId, ApplyPromotionCode, AssignReference, AttachCreditNote, Carrier,
    CarrierId, ChangeAddresses, CreateOrder, CreditNote, CreditNoteId, Customer, CustomerId, Order,
    OrderCommand, OrderEvent, OrderId, OrderLine, OrderStatus, OrderTotals, PricingContext,
    Promotion, RecordDiscount, ReferenceGenerator, SetShipping, SpendCreditNote, compute_totals,
    transition,
};

use crate::error::{SettlementError, SettlementResult};
use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use crate::ledger::{Ledger, UnitOfWork, rehydrate, store};
use crate::stats::DashboardStats;

const ORDER_AGGREGATE: &str = "sales.order";

/// Delivery choice for an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRequest {
    pub carrier_id: Option<CarrierId>,
    pub relay_point_id: Option<String>,
    /// Overrides the carrier's rate.
    pub cost: Option<Money>,
    pub tax_rate: Option<Percentage>,
}

pub struct SettlementService<S: EventStore = InMemoryEventStore> {
    config: EngineConfig,
    events: S,
    ledger: RwLock<Ledger>,
}

impl SettlementService<InMemoryEventStore> {
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(config, InMemoryEventStore::new())
    }
}

impl<S: EventStore> SettlementService<S> {
    pub fn new(config: EngineConfig, events: S) -> Self {
        let ledger = RwLock::new(Ledger::new(&config));
        Self {
            config,
            events,
            ledger,
        }
    }

    /// Reopen a service over stored orders. New references continue after the
    /// latest one found in the store.
    pub fn resume(config: EngineConfig, events: S) -> SettlementResult<Self> {
        let service = Self::new(config, events);
        let prefix = &service.config.order_reference_prefix;
        let mut latest: Option<ReferenceGenerator> = None;
        for id in service.events.stream_ids(ORDER_AGGREGATE)? {
            let order = service.load_order(OrderId::new(id))?;
            let Some(reference) = order.reference() else {
                continue;
            };
            let candidate = ReferenceGenerator::resume_after(prefix.clone(), reference)?;
            if latest.as_ref().is_none_or(|current| candidate > *current) {
                latest = Some(candidate);
            }
        }
        if let Some(references) = latest {
            tracing::info!(?references, "order references resumed");
            service.write(|ledger| {
                ledger.references = references;
                Ok(())
            })?;
        }
        Ok(service)
    }

    pub fn into_event_store(self) -> S {
        self.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn read(&self) -> SettlementResult<RwLockReadGuard<'_, Ledger>> {
        self.ledger.read().map_err(|_| SettlementError::LockPoisoned)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Ledger) -> SettlementResult<T>) -> SettlementResult<T> {
        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| SettlementError::LockPoisoned)?;
        f(&mut *ledger)
    }

    // Catalog.

    pub fn register_tax_rate(&self, rate: TaxRate) -> SettlementResult<()> {
        self.write(|ledger| Ok(ledger.tax_rates.register(rate)?))
    }

    /// Store a product after recomputing its retail prices.
    pub fn save_product(&self, product: Product) -> SettlementResult<PricingOutcome> {
        self.write(|ledger| {
            let id = product.id_typed();
            let preferred = ledger
                .supplier_prices
                .get(&id)
                .and_then(SupplierPriceList::preferred);
            let outcome = recompute_price(&product, preferred);
            store(&mut ledger.products, outcome.product.clone());
            Ok(outcome)
        })
    }

    /// Record a supplier quote and reprice the product it is for.
    pub fn record_supplier_price(&self, quote: SupplierPrice) -> SettlementResult<PricingOutcome> {
        self.write(|ledger| {
            let id = quote.product_id;
            let product = ledger.product(id)?.clone();
            let quotes = ledger.supplier_prices.entry(id).or_default();
            quotes.upsert(quote)?;
            let outcome = recompute_price(&product, quotes.preferred());
            store(&mut ledger.products, outcome.product.clone());
            Ok(outcome)
        })
    }

    /// Move a product to another tax rate; the inclusive price follows the exclusive one.
    pub fn change_product_tax_rate(
        &self,
        product_id: ProductId,
        tax_rate_id: TaxRateId,
    ) -> SettlementResult<PricingOutcome> {
        self.write(|ledger| {
            let rate = ledger
                .tax_rates
                .get(tax_rate_id)
                .ok_or_else(|| SettlementError::not_found("tax rate", tax_rate_id))?
                .clone();
            let mut product = ledger.product(product_id)?.clone();
            product.change_tax_rate(&rate);
            let preferred = ledger
                .supplier_prices
                .get(&product_id)
                .and_then(SupplierPriceList::preferred);
            let outcome = recompute_price(&product, preferred);
            store(&mut ledger.products, outcome.product.clone());
            Ok(outcome)
        })
    }

    pub fn receive_stock(&self, product_id: ProductId, quantity: u32) -> SettlementResult<Product> {
        self.write(|ledger| {
            let product = ledger
                .products
                .get_mut(&product_id)
                .ok_or_else(|| SettlementError::not_found("product", product_id))?;
            product.receive_stock(quantity);
            Ok(product.clone())
        })
    }

    pub fn product(&self, id: ProductId) -> SettlementResult<Product> {
        Ok(self.read()?.product(id)?.clone())
    }

    // Parties, carriers, promotions, credit notes.

    pub fn add_customer(&self, customer: Customer) -> SettlementResult<()> {
        self.write(|ledger| {
            store(&mut ledger.customers, customer);
            Ok(())
        })
    }

    pub fn add_address(&self, address: Address) -> SettlementResult<()> {
        self.write(|ledger| {
            if !ledger.customers.contains_key(&address.customer_id) {
                return Err(SettlementError::not_found("customer", address.customer_id));
            }
            store(&mut ledger.addresses, address);
            Ok(())
        })
    }

    pub fn add_carrier(&self, carrier: Carrier) -> SettlementResult<()> {
        self.write(|ledger| {
            store(&mut ledger.carriers, carrier);
            Ok(())
        })
    }

    pub fn add_promotion(&self, promotion: Promotion) -> SettlementResult<()> {
        self.write(|ledger| Ok(ledger.promotions.add(promotion)?))
    }

    pub fn add_credit_note(&self, note: CreditNote) -> SettlementResult<()> {
        self.write(|ledger| {
            if ledger.credit_notes.values().any(|n| n.code == note.code) {
                return Err(DomainError::conflict(format!(
                    "credit note code {} already exists",
                    note.code
                ))
                .into());
            }
            store(&mut ledger.credit_notes, note);
            Ok(())
        })
    }

    pub fn credit_note(&self, id: CreditNoteId) -> SettlementResult<CreditNote> {
        self.read()?
            .credit_notes
            .get(&id)
            .cloned()
            .ok_or_else(|| SettlementError::not_found("credit note", id))
    }

    // Orders.

    pub fn order(&self, id: OrderId) -> SettlementResult<Order> {
        let order = self.load_order(id)?;
        if !order.is_created() {
            return Err(SettlementError::not_found("order", id));
        }
        Ok(order)
    }

    /// Open a draft order and give it its reference.
    pub fn place_order(
        &self,
        customer_id: CustomerId,
        billing_address_id: AddressId,
        shipping_address_id: Option<AddressId>,
        at: DateTime<Utc>,
    ) -> SettlementResult<Order> {
        let order_id = OrderId::generate();
        let (order, ()) = self.transact(order_id, |uow| {
            let (billing_address, shipping_address) =
                resolve_addresses(uow, billing_address_id, shipping_address_id)?;
            if !uow.customer_exists(customer_id) {
                return Err(SettlementError::not_found("customer", customer_id));
            }
            uow.execute(OrderCommand::CreateOrder(CreateOrder {
                order_id,
                customer_id,
                billing_address,
                shipping_address,
                occurred_at: at,
            }))?;
            let reference = uow.next_reference(at);
            uow.execute(OrderCommand::AssignReference(AssignReference {
                order_id,
                reference,
                occurred_at: at,
            }))?;
            Ok(())
        })?;

        tracing::info!(
            order_id = %order_id,
            reference = order.reference().unwrap_or_default(),
            "order placed"
        );
        Ok(order)
    }

    pub fn change_addresses(
        &self,
        order_id: OrderId,
        billing_address_id: AddressId,
        shipping_address_id: Option<AddressId>,
        at: DateTime<Utc>,
    ) -> SettlementResult<Order> {
        let (order, ()) = self.transact(order_id, |uow| {
            let (billing_address, shipping_address) =
                resolve_addresses(uow, billing_address_id, shipping_address_id)?;
            uow.execute(OrderCommand::ChangeAddresses(ChangeAddresses {
                order_id,
                billing_address,
                shipping_address,
                occurred_at: at,
            }))?;
            Ok(())
        })?;
        Ok(order)
    }

    /// Add a line at the product's current retail price and tax rate.
    pub fn add_line(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> SettlementResult<Order> {
        let (order, ()) = self.transact(order_id, |uow| {
            let line = OrderLine::snapshot(uow.product(product_id)?, quantity)?;
            uow.execute(OrderCommand::AddLine(AddLine {
                order_id,
                line,
                occurred_at: at,
            }))?;
            Ok(())
        })?;
        Ok(order)
    }

    pub fn set_shipping(
        &self,
        order_id: OrderId,
        request: ShippingRequest,
        at: DateTime<Utc>,
    ) -> SettlementResult<Order> {
        let (order, ()) = self.transact(order_id, |uow| {
            let carrier = match request.carrier_id {
                Some(id) => Some(uow.carrier(id)?.clone()),
                None => None,
            };
            uow.execute(OrderCommand::SetShipping(SetShipping {
                order_id,
                carrier,
                relay_point_id: request.relay_point_id,
                cost: request.cost,
                tax_rate: request.tax_rate,
                occurred_at: at,
            }))?;
            Ok(())
        })?;
        Ok(order)
    }

    pub fn apply_promotion_code(
        &self,
        order_id: OrderId,
        code: &str,
        at: DateTime<Utc>,
    ) -> SettlementResult<Order> {
        let (order, ()) = self.transact(order_id, |uow| {
            let promotion = uow
                .promotion_by_code(code)
                .ok_or_else(|| SettlementError::not_found("promotion", code))?;
            uow.execute(OrderCommand::ApplyPromotionCode(ApplyPromotionCode {
                order_id,
                promotion,
                occurred_at: at,
            }))?;
            Ok(())
        })?;
        Ok(order)
    }

    pub fn attach_credit_note(
        &self,
        order_id: OrderId,
        code: &str,
        at: DateTime<Utc>,
    ) -> SettlementResult<Order> {
        let (order, ()) = self.transact(order_id, |uow| {
            let credit_note = uow.credit_note_by_code(code)?;
            uow.execute(OrderCommand::AttachCreditNote(AttachCreditNote {
                order_id,
                credit_note,
                occurred_at: at,
            }))?;
            Ok(())
        })?;
        Ok(order)
    }

    /// Current totals. Side-effect free.
    ///
    /// Promotions are evaluated at `now` while the order is a draft; afterwards
    /// the discounts frozen at settlement apply.
    pub fn totals(&self, order_id: OrderId, now: DateTime<Utc>) -> SettlementResult<OrderTotals> {
        let order = self.order(order_id)?;
        self.totals_of(&order, now)
    }

    fn totals_of(&self, order: &Order, now: DateTime<Utc>) -> SettlementResult<OrderTotals> {
        let ledger = self.read()?;
        let credit_note = order
            .applied_credit_note()
            .and_then(|id| ledger.credit_notes.get(&id));
        Ok(compute_totals(
            order,
            &PricingContext {
                promotions: ledger.promotions.all(),
                credit_note,
                now,
                default_shipping_tax_rate: self.config.default_shipping_tax_rate,
            },
        ))
    }

    /// Change an order's status.
    ///
    /// Leaving `Draft` for `Paid` or `Shipped` settles the order: the attached
    /// credit note is consumed and the discount recorded. Entering `Shipped`
    /// moves stock. Re-saving the current status changes nothing.
    pub fn transition(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> SettlementResult<Order> {
        let (order, ()) = self.transact(order_id, |uow| self.settle(uow, to, at))?;
        Ok(order)
    }

    fn settle(
        &self,
        uow: &mut UnitOfWork<'_>,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> SettlementResult<()> {
        let from = uow.order().status();
        let totals = uow.totals(&self.config, at);
        let step = transition(uow.order(), to, at)?;
        if step.is_noop() {
            return Ok(());
        }

        let settles = from == OrderStatus::Draft && to != OrderStatus::Cancelled;
        uow.record_transition(step)?;
        if !settles {
            return Ok(());
        }

        let order_id = uow.order().id_typed();
        if let Some(note_id) = uow.order().applied_credit_note() {
            uow.credit_note_mut(note_id)?.consume(at)?;
            uow.execute(OrderCommand::SpendCreditNote(SpendCreditNote {
                order_id,
                amount: totals.breakdown.credit_note_discount,
                occurred_at: at,
            }))?;
        }
        uow.execute(OrderCommand::RecordDiscount(RecordDiscount {
            order_id,
            discounts: totals.settled_discounts(),
            occurred_at: at,
        }))?;
        tracing::info!(
            order_id = %order_id,
            grand_total = %totals.grand_total_incl_tax,
            discount = %uow.order().discount_amount(),
            "order settled"
        );
        Ok(())
    }

    /// Cancel an order and refund its grand total as a new credit note.
    pub fn cancel_with_credit_note(
        &self,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> SettlementResult<(Order, CreditNote)> {
        self.transact(order_id, |uow| {
            let order = uow.order();
            if order.status() == OrderStatus::Cancelled {
                return Err(DomainError::invalid_transition(
                    OrderStatus::Cancelled,
                    OrderStatus::Cancelled,
                )
                .into());
            }
            let customer_id = order
                .customer_id()
                .ok_or_else(|| SettlementError::not_found("customer", order_id))?;
            let totals = uow.totals(&self.config, at);
            if uow.order().settled_discounts().is_none() {
                uow.execute(OrderCommand::RecordDiscount(RecordDiscount {
                    order_id,
                    discounts: totals.settled_discounts(),
                    occurred_at: at,
                }))?;
            }

            let step = transition(uow.order(), OrderStatus::Cancelled, at)?;
            uow.record_transition(step)?;

            let note = CreditNote::issue(
                customer_id,
                totals.grand_total_incl_tax,
                at,
                self.config.credit_note_validity_days,
            )?;
            uow.insert_credit_note(note.clone());
            tracing::info!(
                order_id = %order_id,
                credit_note = %note.code,
                amount = %note.amount,
                "credit note issued on cancellation"
            );
            Ok(note)
        })
    }

    /// Figures for the back-office dashboard.
    pub fn dashboard_stats(&self, year: i32, month: u32) -> SettlementResult<DashboardStats> {
        let mut stats = DashboardStats::new(year, month);
        for id in self.events.stream_ids(ORDER_AGGREGATE)? {
            let order = self.load_order(OrderId::new(id))?;
            match order.status() {
                OrderStatus::Draft => stats.draft_orders += 1,
                status if status.is_settled() => {
                    let in_month = order
                        .created_at()
                        .is_some_and(|at| at.year() == year && at.month() == month);
                    if in_month {
                        let totals = self.totals_of(&order, Utc::now())?;
                        stats.record_sale(totals.grand_total_incl_tax);
                    }
                }
                _ => {}
            }
        }

        stats.products_to_reorder = self
            .read()?
            .products
            .values()
            .filter(|p| p.needs_reorder())
            .count();
        Ok(stats)
    }

    fn load_order(&self, id: OrderId) -> SettlementResult<Order> {
        let stream = self.events.load_stream(id.0)?;
        let events = stream
            .iter()
            .map(|stored| stored.decode::<OrderEvent>())
            .collect::<SettlementResult<Vec<_>>>()?;
        let mut order = Order::empty(id);
        rehydrate(&mut order, &events);
        Ok(order)
    }

    /// Run `f` against a working copy of the order; commit everything it staged
    /// or nothing.
    fn transact<T>(
        &self,
        order_id: OrderId,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> SettlementResult<T>,
    ) -> SettlementResult<(Order, T)> {
        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| SettlementError::LockPoisoned)?;
        let order = self.load_order(order_id)?;

        let mut uow = UnitOfWork::new(&*ledger, order);
        let output = match f(&mut uow) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(order_id = %order_id, error = %err, "unit of work rolled back");
                return Err(err);
            }
        };
        let (order, loaded_version, pending, staged) = uow.into_parts();

        let batch = pending
            .iter()
            .map(|event| UncommittedEvent::from_typed(order_id.0, ORDER_AGGREGATE, event))
            .collect::<SettlementResult<Vec<_>>>()?;
        self.events
            .append(batch, ExpectedVersion::Exact(loaded_version))?;
        ledger.commit(staged);

        tracing::debug!(
            order_id = %order_id,
            version = order.version(),
            events = pending.len(),
            "unit of work committed"
        );
        Ok((order, output))
    }
}

fn resolve_addresses(
    uow: &UnitOfWork<'_>,
    billing_address_id: AddressId,
    shipping_address_id: Option<AddressId>,
) -> SettlementResult<(Address, Option<Address>)> {
    let billing = uow.address(billing_address_id)?.clone();
    let shipping = match shipping_address_id {
        Some(id) => Some(uow.address(id)?.clone()),
        None => None,
    };
    Ok((billing, shipping))
}
