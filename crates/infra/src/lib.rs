//! Infrastructure: event-sourced order storage, in-memory reference data and
//! the settlement unit of work.

pub mod error;
pub mod event_store;
mod ledger;
pub mod settlement;
pub mod stats;

pub use error::{SettlementError, SettlementResult};
pub use event_store::{EventStore, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use settlement::{SettlementService, ShippingRequest};
pub use stats::DashboardStats;
