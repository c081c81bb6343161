use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, Entity, Money, domain_id};

use crate::order::Shipping;

domain_id!(
    /// Carrier identifier.
    CarrierId
);

/// Delivery service with a flat tax-exclusive rate and optional free-shipping threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    pub id: CarrierId,
    pub name: String,
    pub base_cost: Money,
    /// Product subtotal (incl. tax) from which delivery is free.
    pub free_shipping_threshold: Option<Money>,
    pub is_relay_point_compatible: bool,
}

impl Carrier {
    pub fn new(name: impl Into<String>, base_cost: Money) -> DomainResult<Self> {
        Ok(Self {
            id: CarrierId::generate(),
            name: name.into(),
            base_cost: base_cost.ensure_non_negative("base_cost")?,
            free_shipping_threshold: None,
            is_relay_point_compatible: false,
        })
    }

    pub fn with_free_shipping_from(mut self, threshold: Money) -> Self {
        self.free_shipping_threshold = Some(threshold);
        self
    }

    pub fn relay_compatible(mut self) -> Self {
        self.is_relay_point_compatible = true;
        self
    }

    /// Shipping at this carrier's rate; the threshold is checked when the order is priced.
    pub fn shipping(&self) -> Shipping {
        Shipping {
            carrier_id: Some(self.id),
            relay_point_id: None,
            cost: self.base_cost,
            free_shipping_threshold: self.free_shipping_threshold,
            tax_rate: None,
        }
    }

    pub fn ensure_relay_point(&self, relay_point_id: Option<&str>) -> DomainResult<()> {
        if !self.is_relay_point_compatible {
            return Err(DomainError::validation(format!(
                "carrier {} does not deliver to relay points",
                self.name
            )));
        }
        match relay_point_id {
            Some(id) if !id.trim().is_empty() => Ok(()),
            _ => Err(DomainError::validation("relay point delivery requires a relay point id")),
        }
    }
}

impl Entity for Carrier {
    type Id = CarrierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
