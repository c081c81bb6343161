//! Stock reaction to order status changes.
//!
//! Stock leaves the warehouse on the transition into `Shipped` and on no other
//! event. Deltas are derived from the events a transition emits, so re-saving an
//! order that is already shipped produces none.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_catalog::ProductId;
use atelier_core::DomainResult;
use atelier_events::execute;

use crate::order::{ChangeStatus, Order, OrderCommand, OrderEvent, OrderStatus};

/// Signed stock movement for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta {
    pub product_id: ProductId,
    pub delta: i64,
}

/// Stock movements implied by `events` applied to `order`.
///
/// Lines of the same product collapse into one delta, ordered by product id.
pub fn stock_deltas(order: &Order, events: &[OrderEvent]) -> Vec<StockDelta> {
    let ships = events.iter().any(|e| {
        matches!(e, OrderEvent::StatusChanged(change)
            if change.to == OrderStatus::Shipped && change.from != OrderStatus::Shipped)
    });
    if !ships {
        return Vec::new();
    }

    let mut per_product: BTreeMap<ProductId, i64> = BTreeMap::new();
    for line in order.lines() {
        *per_product.entry(line.product_id()).or_default() -= i64::from(line.quantity);
    }

    per_product
        .into_iter()
        .map(|(product_id, delta)| StockDelta { product_id, delta })
        .collect()
}

/// Result of a status change: the new order, the events to persist and the
/// stock movements to apply alongside them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub order: Order,
    pub events: Vec<OrderEvent>,
    pub stock_deltas: Vec<StockDelta>,
}

impl StatusTransition {
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// Move `order` to `to`.
///
/// The input order is left untouched; callers commit the returned state and the
/// deltas together.
pub fn transition(
    order: &Order,
    to: OrderStatus,
    at: DateTime<Utc>,
) -> DomainResult<StatusTransition> {
    let mut next = order.clone();
    let from = next.status();
    let events = execute(
        &mut next,
        &OrderCommand::ChangeStatus(ChangeStatus {
            order_id: order.id_typed(),
            to,
            occurred_at: at,
        }),
    )?;
    let deltas = stock_deltas(&next, &events);

    if events.is_empty() {
        tracing::debug!(order_id = %order.id_typed(), status = %from, "status unchanged");
    } else {
        tracing::info!(
            order_id = %order.id_typed(),
            from = %from,
            to = %to,
            stock_deltas = deltas.len(),
            "order status changed"
        );
    }

    Ok(StatusTransition {
        order: next,
        events,
        stock_deltas: deltas,
    })
}
