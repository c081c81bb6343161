use thiserror::Error;

use atelier_core::DomainError;

/// Failure of a settlement operation. Nothing is committed when one is returned.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl SettlementError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;
