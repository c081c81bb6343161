use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{Aggregate, AggregateRoot, DomainError, Money, Percentage, domain_id};
use atelier_events::Event;

use crate::carrier::{Carrier, CarrierId};
use crate::credit_note::{CreditNote, CreditNoteId};
use crate::line::OrderLine;
use crate::party::{Address, AddressId, CustomerId, validate_order_addresses};
use crate::promotion::{LineDiscount, Promotion, PromotionId};

domain_id!(
    /// Sales order identifier.
    OrderId
);

/// Order status lifecycle.
///
/// Forward only: `Draft -> Paid -> Shipped -> Delivered`, with `Cancelled`
/// reachable from `Draft` or `Paid`. Shipped orders are reversed with a credit
/// note, never by moving the status back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Draft, Paid)
                | (Draft, Shipped)
                | (Paid, Shipped)
                | (Shipped, Delivered)
                | (Draft, Cancelled)
                | (Paid, Cancelled)
        )
    }

    /// Counted as revenue.
    pub fn is_settled(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Paid => "PAID",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Delivery settings of an order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Shipping {
    pub carrier_id: Option<CarrierId>,
    pub relay_point_id: Option<String>,
    /// Tax-exclusive flat cost, or the carrier's base rate.
    pub cost: Money,
    /// Carried over from the carrier when no explicit cost was given.
    pub free_shipping_threshold: Option<Money>,
    /// Falls back to the configured default when unset.
    pub tax_rate: Option<Percentage>,
}

impl Shipping {
    /// Tax-exclusive cost for the given product subtotal (incl. tax).
    pub fn cost_for(&self, products_total_incl_tax: Money) -> Money {
        match self.free_shipping_threshold {
            Some(threshold) if products_total_incl_tax >= threshold => Money::ZERO,
            _ => self.cost.round2(),
        }
    }
}

/// Promotion discounts frozen when the order was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledDiscounts {
    pub line_discounts: Vec<LineDiscount>,
    pub automatic: Money,
    pub coded: Money,
}

impl SettledDiscounts {
    pub fn total(&self) -> Money {
        self.automatic + self.coded
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    reference: Option<String>,
    customer_id: Option<CustomerId>,
    status: OrderStatus,
    billing_address_id: Option<AddressId>,
    shipping_address_id: Option<AddressId>,
    shipping: Shipping,
    applied_promotion: Option<PromotionId>,
    applied_credit_note: Option<CreditNoteId>,
    credit_note_spent: Option<Money>,
    settled_discounts: Option<SettledDiscounts>,
    lines: Vec<OrderLine>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            reference: None,
            customer_id: None,
            status: OrderStatus::Draft,
            billing_address_id: None,
            shipping_address_id: None,
            shipping: Shipping::default(),
            applied_promotion: None,
            applied_credit_note: None,
            credit_note_spent: None,
            settled_discounts: None,
            lines: Vec::new(),
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn billing_address_id(&self) -> Option<AddressId> {
        self.billing_address_id
    }

    pub fn shipping_address_id(&self) -> Option<AddressId> {
        self.shipping_address_id
    }

    pub fn shipping(&self) -> &Shipping {
        &self.shipping
    }

    pub fn applied_promotion(&self) -> Option<PromotionId> {
        self.applied_promotion
    }

    pub fn applied_credit_note(&self) -> Option<CreditNoteId> {
        self.applied_credit_note
    }

    /// Credit drawn from the attached note when the order was settled.
    pub fn credit_note_spent(&self) -> Option<Money> {
        self.credit_note_spent
    }

    /// Promotion discounts frozen at settlement; `None` while the order is open.
    pub fn settled_discounts(&self) -> Option<&SettledDiscounts> {
        self.settled_discounts.as_ref()
    }

    /// Discount granted at settlement (promotions + credit note).
    pub fn discount_amount(&self) -> Money {
        let promotions = self
            .settled_discounts
            .as_ref()
            .map(SettledDiscounts::total)
            .unwrap_or(Money::ZERO);
        promotions + self.credit_note_spent.unwrap_or(Money::ZERO)
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, OrderStatus::Draft)
    }

    pub fn products_total_incl_tax(&self) -> Money {
        self.lines.iter().map(OrderLine::total_incl_tax).sum()
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub billing_address: Address,
    pub shipping_address: Option<Address>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeAddresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAddresses {
    pub order_id: OrderId,
    pub billing_address: Address,
    pub shipping_address: Option<Address>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignReference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignReference {
    pub order_id: OrderId,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub order_id: OrderId,
    pub line: OrderLine,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetShipping.
///
/// Without an explicit `cost`, the carrier's rate applies to the product total
/// at pricing time, so later lines can still reach its free-shipping threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetShipping {
    pub order_id: OrderId,
    pub carrier: Option<Carrier>,
    pub relay_point_id: Option<String>,
    pub cost: Option<Money>,
    pub tax_rate: Option<Percentage>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyPromotionCode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPromotionCode {
    pub order_id: OrderId,
    pub promotion: Promotion,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachCreditNote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachCreditNote {
    pub order_id: OrderId,
    pub credit_note: CreditNote,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SpendCreditNote.
///
/// Records the credit the attached note contributed; the note itself is marked
/// used by the caller in the same unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendCreditNote {
    pub order_id: OrderId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDiscount.
///
/// Freezes the promotion discounts the order was settled with. Recorded once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDiscount {
    pub order_id: OrderId,
    pub discounts: SettledDiscounts,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub order_id: OrderId,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    ChangeAddresses(ChangeAddresses),
    AssignReference(AssignReference),
    AddLine(AddLine),
    SetShipping(SetShipping),
    ApplyPromotionCode(ApplyPromotionCode),
    AttachCreditNote(AttachCreditNote),
    SpendCreditNote(SpendCreditNote),
    RecordDiscount(RecordDiscount),
    ChangeStatus(ChangeStatus),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub billing_address_id: AddressId,
    pub shipping_address_id: Option<AddressId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AddressesChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressesChanged {
    pub order_id: OrderId,
    pub billing_address_id: AddressId,
    pub shipping_address_id: Option<AddressId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReferenceAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAssigned {
    pub order_id: OrderId,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub order_id: OrderId,
    pub line: OrderLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShippingSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingSet {
    pub order_id: OrderId,
    pub shipping: Shipping,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PromotionApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionApplied {
    pub order_id: OrderId,
    pub promotion_id: PromotionId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CreditNoteAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteAttached {
    pub order_id: OrderId,
    pub credit_note_id: CreditNoteId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CreditNoteSpent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteSpent {
    pub order_id: OrderId,
    pub credit_note_id: CreditNoteId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DiscountRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRecorded {
    pub order_id: OrderId,
    pub discounts: SettledDiscounts,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    AddressesChanged(AddressesChanged),
    ReferenceAssigned(ReferenceAssigned),
    LineAdded(LineAdded),
    ShippingSet(ShippingSet),
    PromotionApplied(PromotionApplied),
    CreditNoteAttached(CreditNoteAttached),
    CreditNoteSpent(CreditNoteSpent),
    DiscountRecorded(DiscountRecorded),
    StatusChanged(StatusChanged),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "sales.order.created",
            OrderEvent::AddressesChanged(_) => "sales.order.addresses_changed",
            OrderEvent::ReferenceAssigned(_) => "sales.order.reference_assigned",
            OrderEvent::LineAdded(_) => "sales.order.line_added",
            OrderEvent::ShippingSet(_) => "sales.order.shipping_set",
            OrderEvent::PromotionApplied(_) => "sales.order.promotion_applied",
            OrderEvent::CreditNoteAttached(_) => "sales.order.credit_note_attached",
            OrderEvent::CreditNoteSpent(_) => "sales.order.credit_note_spent",
            OrderEvent::DiscountRecorded(_) => "sales.order.discount_recorded",
            OrderEvent::StatusChanged(_) => "sales.order.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::AddressesChanged(e) => e.occurred_at,
            OrderEvent::ReferenceAssigned(e) => e.occurred_at,
            OrderEvent::LineAdded(e) => e.occurred_at,
            OrderEvent::ShippingSet(e) => e.occurred_at,
            OrderEvent::PromotionApplied(e) => e.occurred_at,
            OrderEvent::CreditNoteAttached(e) => e.occurred_at,
            OrderEvent::CreditNoteSpent(e) => e.occurred_at,
            OrderEvent::DiscountRecorded(e) => e.occurred_at,
            OrderEvent::StatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.customer_id = Some(e.customer_id);
                self.billing_address_id = Some(e.billing_address_id);
                self.shipping_address_id = e.shipping_address_id;
                self.status = OrderStatus::Draft;
                self.lines.clear();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::AddressesChanged(e) => {
                self.billing_address_id = Some(e.billing_address_id);
                self.shipping_address_id = e.shipping_address_id;
            }
            OrderEvent::ReferenceAssigned(e) => {
                self.reference = Some(e.reference.clone());
            }
            OrderEvent::LineAdded(e) => {
                self.lines.push(e.line.clone());
            }
            OrderEvent::ShippingSet(e) => {
                self.shipping = e.shipping.clone();
            }
            OrderEvent::PromotionApplied(e) => {
                self.applied_promotion = Some(e.promotion_id);
            }
            OrderEvent::CreditNoteAttached(e) => {
                self.applied_credit_note = Some(e.credit_note_id);
            }
            OrderEvent::CreditNoteSpent(e) => {
                self.credit_note_spent = Some(e.amount);
            }
            OrderEvent::DiscountRecorded(e) => {
                self.settled_discounts = Some(e.discounts.clone());
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::ChangeAddresses(cmd) => self.handle_change_addresses(cmd),
            OrderCommand::AssignReference(cmd) => self.handle_assign_reference(cmd),
            OrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            OrderCommand::SetShipping(cmd) => self.handle_set_shipping(cmd),
            OrderCommand::ApplyPromotionCode(cmd) => self.handle_apply_promotion(cmd),
            OrderCommand::AttachCreditNote(cmd) => self.handle_attach_credit_note(cmd),
            OrderCommand::SpendCreditNote(cmd) => self.handle_spend_credit_note(cmd),
            OrderCommand::RecordDiscount(cmd) => self.handle_record_discount(cmd),
            OrderCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
        }
    }
}

impl Order {
    fn ensure_created(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_modifiable(&self) -> Result<(), DomainError> {
        if !self.is_modifiable() {
            return Err(DomainError::invariant(format!(
                "cannot modify order in status {}",
                self.status
            )));
        }
        Ok(())
    }

    fn owner(&self) -> Result<CustomerId, DomainError> {
        self.customer_id
            .ok_or_else(|| DomainError::invariant("order has no customer"))
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        validate_order_addresses(
            cmd.customer_id,
            &cmd.billing_address,
            cmd.shipping_address.as_ref(),
        )?;

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            billing_address_id: cmd.billing_address.id,
            shipping_address_id: cmd.shipping_address.as_ref().map(|a| a.id),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_addresses(
        &self,
        cmd: &ChangeAddresses,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        self.ensure_modifiable()?;
        validate_order_addresses(
            self.owner()?,
            &cmd.billing_address,
            cmd.shipping_address.as_ref(),
        )?;

        Ok(vec![OrderEvent::AddressesChanged(AddressesChanged {
            order_id: cmd.order_id,
            billing_address_id: cmd.billing_address.id,
            shipping_address_id: cmd.shipping_address.as_ref().map(|a| a.id),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_reference(
        &self,
        cmd: &AssignReference,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        if self.reference.is_some() {
            return Err(DomainError::conflict("order reference is immutable once assigned"));
        }
        if cmd.reference.trim().is_empty() {
            return Err(DomainError::validation("reference cannot be empty"));
        }

        Ok(vec![OrderEvent::ReferenceAssigned(ReferenceAssigned {
            order_id: cmd.order_id,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        self.ensure_modifiable()?;

        if cmd.line.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let mut line = cmd.line.clone();
        line.line_no = (self.lines.len() as u32) + 1;

        Ok(vec![OrderEvent::LineAdded(LineAdded {
            order_id: cmd.order_id,
            line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_shipping(&self, cmd: &SetShipping) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        self.ensure_modifiable()?;

        if cmd.relay_point_id.is_some() {
            let carrier = cmd.carrier.as_ref().ok_or_else(|| {
                DomainError::validation("relay point delivery requires a carrier")
            })?;
            carrier.ensure_relay_point(cmd.relay_point_id.as_deref())?;
        }

        let mut shipping = cmd.carrier.as_ref().map(Carrier::shipping).unwrap_or_default();
        if let Some(cost) = cmd.cost {
            shipping.cost = cost.ensure_non_negative("shipping_cost")?.round2();
            shipping.free_shipping_threshold = None;
        }
        shipping.relay_point_id = cmd.relay_point_id.clone();
        shipping.tax_rate = cmd.tax_rate;

        Ok(vec![OrderEvent::ShippingSet(ShippingSet {
            order_id: cmd.order_id,
            shipping,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_promotion(
        &self,
        cmd: &ApplyPromotionCode,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        self.ensure_modifiable()?;

        if cmd.promotion.is_automatic() {
            return Err(DomainError::validation(
                "automatic promotions are not attached to orders",
            ));
        }
        if !cmd.promotion.is_valid(cmd.occurred_at) {
            return Err(DomainError::validation("promotion code is not valid now"));
        }

        Ok(vec![OrderEvent::PromotionApplied(PromotionApplied {
            order_id: cmd.order_id,
            promotion_id: cmd.promotion.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach_credit_note(
        &self,
        cmd: &AttachCreditNote,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        self.ensure_modifiable()?;

        if let Some(existing) = self.applied_credit_note {
            if existing != cmd.credit_note.id {
                return Err(DomainError::conflict("order already carries a credit note"));
            }
            return Ok(vec![]);
        }
        if cmd.credit_note.customer_id != self.owner()? {
            return Err(DomainError::credit_note_invalid(
                "credit note belongs to another customer",
            ));
        }
        cmd.credit_note.ensure_spendable(cmd.occurred_at)?;

        Ok(vec![OrderEvent::CreditNoteAttached(CreditNoteAttached {
            order_id: cmd.order_id,
            credit_note_id: cmd.credit_note.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_spend_credit_note(
        &self,
        cmd: &SpendCreditNote,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        let credit_note_id = self
            .applied_credit_note
            .ok_or_else(|| DomainError::credit_note_invalid("order carries no credit note"))?;
        if self.credit_note_spent.is_some() {
            return Err(DomainError::credit_note_invalid("credit note already spent on this order"));
        }

        Ok(vec![OrderEvent::CreditNoteSpent(CreditNoteSpent {
            order_id: cmd.order_id,
            credit_note_id,
            amount: cmd.amount.ensure_non_negative("credit_note_spent")?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_discount(
        &self,
        cmd: &RecordDiscount,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        if self.settled_discounts.is_some() {
            return Err(DomainError::conflict("order discounts are already settled"));
        }
        cmd.discounts.automatic.ensure_non_negative("automatic_discount")?;
        cmd.discounts.coded.ensure_non_negative("coded_discount")?;

        Ok(vec![OrderEvent::DiscountRecorded(DiscountRecorded {
            order_id: cmd.order_id,
            discounts: cmd.discounts.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeStatus) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;

        // Saving with the current status is not a transition.
        if cmd.to == self.status {
            return Ok(vec![]);
        }
        if !self.status.can_transition_to(cmd.to) {
            return Err(DomainError::invalid_transition(self.status, cmd.to));
        }
        if cmd.to != OrderStatus::Cancelled && self.lines.is_empty() {
            return Err(DomainError::validation("cannot settle an order without lines"));
        }

        Ok(vec![OrderEvent::StatusChanged(StatusChanged {
            order_id: cmd.order_id,
            from: self.status,
            to: cmd.to,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::ProductRef;
    use crate::party::AddressKind;
    use crate::promotion::{Discount, PromotionKind};
    use atelier_catalog::{CategoryId, ProductId};
    use atelier_events::execute;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    struct Fixture {
        order: Order,
        customer_id: CustomerId,
    }

    fn created_order() -> Fixture {
        let order_id = OrderId::generate();
        let customer_id = CustomerId::generate();
        let mut order = Order::empty(order_id);
        execute(
            &mut order,
            &OrderCommand::CreateOrder(CreateOrder {
                order_id,
                customer_id,
                billing_address: Address::new(customer_id, AddressKind::Billing, "Home"),
                shipping_address: Some(Address::new(customer_id, AddressKind::Shipping, "Office")),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        Fixture { order, customer_id }
    }

    fn line(qty: u32) -> OrderLine {
        OrderLine {
            line_no: 0,
            product: ProductRef {
                product_id: ProductId::generate(),
                category_id: CategoryId::generate(),
                brand_id: None,
            },
            quantity: qty,
            unit_price_incl_tax: Money::new(dec!(43.20)),
            tax_rate: Percentage::whole(20),
        }
    }

    fn add_line(order: &mut Order, qty: u32) {
        let order_id = order.id_typed();
        execute(
            order,
            &OrderCommand::AddLine(AddLine {
                order_id,
                line: line(qty),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
    }

    fn change_status(order: &Order, to: OrderStatus) -> Result<Vec<OrderEvent>, DomainError> {
        order.handle(&OrderCommand::ChangeStatus(ChangeStatus {
            order_id: order.id_typed(),
            to,
            occurred_at: test_time(),
        }))
    }

    #[test]
    fn create_order_emits_order_created_event() {
        let Fixture { order, customer_id } = created_order();
        assert!(order.is_created());
        assert_eq!(order.customer_id(), Some(customer_id));
        assert_eq!(order.status(), OrderStatus::Draft);
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn create_rejects_shipping_address_used_as_billing() {
        let order_id = OrderId::generate();
        let customer_id = CustomerId::generate();
        let order = Order::empty(order_id);
        let err = order
            .handle(&OrderCommand::CreateOrder(CreateOrder {
                order_id,
                customer_id,
                billing_address: Address::new(customer_id, AddressKind::Shipping, "Office"),
                shipping_address: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidAddress(_)));
    }

    #[test]
    fn change_addresses_checks_ownership() {
        let Fixture { order, .. } = created_order();
        let stranger = CustomerId::generate();
        let err = order
            .handle(&OrderCommand::ChangeAddresses(ChangeAddresses {
                order_id: order.id_typed(),
                billing_address: Address::new(stranger, AddressKind::Billing, "Home"),
                shipping_address: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidAddress(_)));
    }

    #[test]
    fn add_line_numbers_lines_sequentially() {
        let Fixture { mut order, .. } = created_order();
        add_line(&mut order, 1);
        add_line(&mut order, 2);
        let numbers: Vec<u32> = order.lines().iter().map(|l| l.line_no).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(order.products_total_incl_tax(), Money::new(dec!(129.60)));
    }

    #[test]
    fn forward_transitions_are_accepted() {
        let Fixture { mut order, .. } = created_order();
        add_line(&mut order, 1);
        for next in [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered] {
            let order_id = order.id_typed();
            execute(
                &mut order,
                &OrderCommand::ChangeStatus(ChangeStatus {
                    order_id,
                    to: next,
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
            assert_eq!(order.status(), next);
        }
    }

    #[test]
    fn backward_and_skipping_transitions_are_rejected() {
        let Fixture { mut order, .. } = created_order();
        add_line(&mut order, 1);
        let order_id = order.id_typed();
        execute(
            &mut order,
            &OrderCommand::ChangeStatus(ChangeStatus {
                order_id,
                to: OrderStatus::Shipped,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        for to in [OrderStatus::Draft, OrderStatus::Paid, OrderStatus::Cancelled] {
            let err = change_status(&order, to).unwrap_err();
            assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        }
        assert_eq!(order.status(), OrderStatus::Shipped);

        let mut draft = created_order().order;
        add_line(&mut draft, 1);
        assert!(matches!(
            change_status(&draft, OrderStatus::Delivered),
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn resaving_current_status_emits_nothing() {
        let Fixture { mut order, .. } = created_order();
        add_line(&mut order, 1);
        let version = order.version();
        assert!(change_status(&order, OrderStatus::Draft).unwrap().is_empty());
        assert_eq!(order.version(), version);
    }

    #[test]
    fn cannot_settle_empty_order_but_can_cancel_it() {
        let Fixture { order, .. } = created_order();
        assert!(matches!(
            change_status(&order, OrderStatus::Paid),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(change_status(&order, OrderStatus::Cancelled).unwrap().len(), 1);
    }

    #[test]
    fn cannot_add_lines_once_paid() {
        let Fixture { mut order, .. } = created_order();
        add_line(&mut order, 1);
        let order_id = order.id_typed();
        execute(
            &mut order,
            &OrderCommand::ChangeStatus(ChangeStatus {
                order_id,
                to: OrderStatus::Paid,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = order
            .handle(&OrderCommand::AddLine(AddLine {
                order_id,
                line: line(1),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("PAID")));
    }

    #[test]
    fn reference_is_assigned_once() {
        let Fixture { mut order, .. } = created_order();
        let order_id = order.id_typed();
        let assign = |reference: &str| {
            OrderCommand::AssignReference(AssignReference {
                order_id,
                reference: reference.to_string(),
                occurred_at: test_time(),
            })
        };
        execute(&mut order, &assign("ORD-2025-0001")).unwrap();
        assert_eq!(order.reference(), Some("ORD-2025-0001"));

        assert!(matches!(
            order.handle(&assign("ORD-2025-0002")),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn shipping_cost_comes_from_carrier_threshold() {
        let Fixture { mut order, .. } = created_order();
        add_line(&mut order, 2);
        let order_id = order.id_typed();
        let carrier = Carrier::new("Colissimo", Money::new(dec!(12.50)))
            .unwrap()
            .with_free_shipping_from(Money::new(dec!(80)));

        execute(
            &mut order,
            &OrderCommand::SetShipping(SetShipping {
                order_id,
                carrier: Some(carrier.clone()),
                relay_point_id: None,
                cost: None,
                tax_rate: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.shipping().cost_for(order.products_total_incl_tax()), Money::ZERO);
        assert_eq!(order.shipping().carrier_id, Some(carrier.id));

        let err = order
            .handle(&OrderCommand::SetShipping(SetShipping {
                order_id,
                carrier: Some(carrier),
                relay_point_id: Some("R-12".to_string()),
                cost: None,
                tax_rate: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn lines_added_after_carrier_can_reach_free_shipping() {
        let Fixture { mut order, .. } = created_order();
        let order_id = order.id_typed();
        let carrier = Carrier::new("Colissimo", Money::new(dec!(12.50)))
            .unwrap()
            .with_free_shipping_from(Money::new(dec!(50)));
        execute(
            &mut order,
            &OrderCommand::SetShipping(SetShipping {
                order_id,
                carrier: Some(carrier),
                relay_point_id: None,
                cost: None,
                tax_rate: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(
            order.shipping().cost_for(order.products_total_incl_tax()),
            Money::new(dec!(12.50))
        );

        add_line(&mut order, 2);
        assert_eq!(order.shipping().cost_for(order.products_total_incl_tax()), Money::ZERO);
    }

    #[test]
    fn explicit_shipping_cost_ignores_carrier_threshold() {
        let Fixture { mut order, .. } = created_order();
        add_line(&mut order, 2);
        let order_id = order.id_typed();
        let carrier = Carrier::new("Colissimo", Money::new(dec!(12.50)))
            .unwrap()
            .with_free_shipping_from(Money::new(dec!(50)));
        execute(
            &mut order,
            &OrderCommand::SetShipping(SetShipping {
                order_id,
                carrier: Some(carrier),
                relay_point_id: None,
                cost: Some(Money::new(dec!(7))),
                tax_rate: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(
            order.shipping().cost_for(order.products_total_incl_tax()),
            Money::new(dec!(7))
        );
    }

    #[test]
    fn discounts_are_settled_once() {
        let Fixture { mut order, .. } = created_order();
        add_line(&mut order, 1);
        let order_id = order.id_typed();
        let record = OrderCommand::RecordDiscount(RecordDiscount {
            order_id,
            discounts: SettledDiscounts {
                line_discounts: vec![],
                automatic: Money::new(dec!(2)),
                coded: Money::new(dec!(8.64)),
            },
            occurred_at: test_time(),
        });
        assert_eq!(order.discount_amount(), Money::ZERO);

        execute(&mut order, &record).unwrap();
        assert_eq!(order.discount_amount(), Money::new(dec!(10.64)));
        assert!(matches!(order.handle(&record), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn only_valid_coded_promotions_attach() {
        let Fixture { order, .. } = created_order();
        let t = test_time();
        let discount = Discount::Percent(Percentage::whole(20));
        let automatic = Promotion::automatic(
            "Sale",
            PromotionKind::StoreWide,
            discount,
            t - Duration::days(1),
            t + Duration::days(1),
        )
        .unwrap();
        let expired =
            Promotion::coded("Old", "OLD", discount, t - Duration::days(9), t - Duration::days(1))
                .unwrap();
        let good =
            Promotion::coded("New", "NEW", discount, t - Duration::days(1), t + Duration::days(1))
                .unwrap();

        let apply = |promotion: Promotion| {
            order.handle(&OrderCommand::ApplyPromotionCode(ApplyPromotionCode {
                order_id: order.id_typed(),
                promotion,
                occurred_at: t,
            }))
        };
        assert!(apply(automatic).is_err());
        assert!(apply(expired).is_err());
        assert_eq!(apply(good).unwrap().len(), 1);
    }

    #[test]
    fn credit_note_must_belong_to_customer_and_be_spendable() {
        let Fixture { mut order, customer_id } = created_order();
        let t = test_time();
        let order_id = order.id_typed();
        let attach = |credit_note: CreditNote| {
            OrderCommand::AttachCreditNote(AttachCreditNote {
                order_id,
                credit_note,
                occurred_at: t,
            })
        };

        let foreign = CreditNote::issue(CustomerId::generate(), Money::new(dec!(5)), t, 365).unwrap();
        assert!(matches!(
            order.handle(&attach(foreign)),
            Err(DomainError::CreditNoteInvalid(_))
        ));

        let mut used = CreditNote::issue(customer_id, Money::new(dec!(5)), t, 365).unwrap();
        used.consume(t).unwrap();
        assert!(matches!(
            order.handle(&attach(used)),
            Err(DomainError::CreditNoteInvalid(_))
        ));

        let fresh = CreditNote::issue(customer_id, Money::new(dec!(5)), t, 365).unwrap();
        execute(&mut order, &attach(fresh.clone())).unwrap();
        assert_eq!(order.applied_credit_note(), Some(fresh.id));

        let second = CreditNote::issue(customer_id, Money::new(dec!(5)), t, 365).unwrap();
        assert!(matches!(order.handle(&attach(second)), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn credit_note_is_spent_once() {
        let Fixture { mut order, customer_id } = created_order();
        let t = test_time();
        let order_id = order.id_typed();
        let spend = OrderCommand::SpendCreditNote(SpendCreditNote {
            order_id,
            amount: Money::new(dec!(5)),
            occurred_at: t,
        });
        assert!(matches!(order.handle(&spend), Err(DomainError::CreditNoteInvalid(_))));

        let note = CreditNote::issue(customer_id, Money::new(dec!(5)), t, 365).unwrap();
        execute(
            &mut order,
            &OrderCommand::AttachCreditNote(AttachCreditNote {
                order_id,
                credit_note: note,
                occurred_at: t,
            }),
        )
        .unwrap();
        execute(&mut order, &spend).unwrap();
        assert_eq!(order.credit_note_spent(), Some(Money::new(dec!(5))));
        assert!(matches!(order.handle(&spend), Err(DomainError::CreditNoteInvalid(_))));
    }

    #[test]
    fn apply_is_deterministic() {
        let Fixture { mut order, .. } = created_order();
        add_line(&mut order, 3);

        let mut replayed = Order::empty(order.id_typed());
        let events = vec![
            OrderEvent::OrderCreated(OrderCreated {
                order_id: order.id_typed(),
                customer_id: order.customer_id().unwrap(),
                billing_address_id: order.billing_address_id().unwrap(),
                shipping_address_id: order.shipping_address_id(),
                occurred_at: order.created_at().unwrap(),
            }),
            OrderEvent::LineAdded(LineAdded {
                order_id: order.id_typed(),
                line: order.lines()[0].clone(),
                occurred_at: test_time(),
            }),
        ];
        for e in &events {
            replayed.apply(e);
        }

        assert_eq!(replayed, order);
    }
}
