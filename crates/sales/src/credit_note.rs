//! Store credit: issuance, availability and one-shot consumption.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, Entity, Money, domain_id};

use crate::party::CustomerId;

domain_id!(
    /// Credit note identifier.
    CreditNoteId
);

const CODE_PREFIX: &str = "AV";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNote {
    pub id: CreditNoteId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub code: String,
    is_used: bool,
    pub issued_at: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
}

impl CreditNote {
    /// Issue a note valid for `validity_days` from `now`, with a fresh code.
    pub fn issue(
        customer_id: CustomerId,
        amount: Money,
        now: DateTime<Utc>,
        validity_days: u32,
    ) -> DomainResult<Self> {
        let amount = amount.ensure_non_negative("credit note amount")?.round2();
        let id = CreditNoteId::generate();
        Ok(Self {
            id,
            customer_id,
            amount,
            code: generate_code(&id),
            is_used: false,
            issued_at: now,
            expiry_date: now + Duration::days(i64::from(validity_days)),
        })
    }

    pub fn is_used(&self) -> bool {
        self.is_used
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date < now
    }

    /// Value the note can still contribute; zero once used or expired.
    pub fn available_amount(&self, now: DateTime<Utc>) -> Money {
        if self.is_used || self.is_expired(now) {
            Money::ZERO
        } else {
            self.amount
        }
    }

    pub fn ensure_spendable(&self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_used {
            return Err(DomainError::credit_note_invalid(format!(
                "credit note {} already used",
                self.code
            )));
        }
        if self.is_expired(now) {
            return Err(DomainError::credit_note_invalid(format!(
                "credit note {} expired on {}",
                self.code,
                self.expiry_date.date_naive()
            )));
        }
        Ok(())
    }

    /// Mark the note used. Terminal: a used note never becomes spendable again.
    pub fn consume(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_spendable(now)?;
        self.is_used = true;
        tracing::info!(credit_note = %self.code, amount = %self.amount, "credit note consumed");
        Ok(())
    }
}

impl Entity for CreditNote {
    type Id = CreditNoteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// `AV-` followed by the last 8 hex digits of the id; the id's random tail keeps codes unique.
fn generate_code(id: &CreditNoteId) -> String {
    let hex = id.0.as_uuid().simple().to_string().to_uppercase();
    format!("{CODE_PREFIX}-{}", &hex[hex.len() - 8..])
}
