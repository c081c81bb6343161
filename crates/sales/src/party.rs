use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, Entity, domain_id};

domain_id!(
    /// Customer identifier.
    CustomerId
);
domain_id!(
    /// Address identifier.
    AddressId
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl Customer {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> DomainResult<Self> {
        let email = email.into();
        if !email.contains('@') {
            return Err(DomainError::validation("email must contain '@'"));
        }
        Ok(Self {
            id: CustomerId::generate(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email,
        })
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Role an address is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AddressKind {
    Billing,
    Shipping,
}

impl core::fmt::Display for AddressKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AddressKind::Billing => f.write_str("BILLING"),
            AddressKind::Shipping => f.write_str("SHIPPING"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub customer_id: CustomerId,
    pub kind: AddressKind,
    /// e.g. "Home", "Office".
    pub label: String,
    pub full_address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub is_default: bool,
}

impl Address {
    pub fn new(customer_id: CustomerId, kind: AddressKind, label: impl Into<String>) -> Self {
        Self {
            id: AddressId::generate(),
            customer_id,
            kind,
            label: label.into(),
            full_address: String::new(),
            city: String::new(),
            postal_code: String::new(),
            country: "France".to_string(),
            is_default: false,
        }
    }

    /// The address may stand in `role` on an order of `customer_id`.
    pub fn ensure_usable_as(&self, role: AddressKind, customer_id: CustomerId) -> DomainResult<()> {
        if self.kind != role {
            return Err(DomainError::invalid_address(format!(
                "{} address must be of type {role}, got {}",
                role.to_string().to_lowercase(),
                self.kind
            )));
        }
        if self.customer_id != customer_id {
            return Err(DomainError::invalid_address(format!(
                "{} address does not belong to the order's customer",
                role.to_string().to_lowercase()
            )));
        }
        Ok(())
    }
}

impl Entity for Address {
    type Id = AddressId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Billing is mandatory, shipping optional (pick-up / relay orders).
pub fn validate_order_addresses(
    customer_id: CustomerId,
    billing: &Address,
    shipping: Option<&Address>,
) -> DomainResult<()> {
    if let Some(shipping) = shipping {
        shipping.ensure_usable_as(AddressKind::Shipping, customer_id)?;
    }
    billing.ensure_usable_as(AddressKind::Billing, customer_id)
}
