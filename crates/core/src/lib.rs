//! `atelier-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, fixed-point money, the error model and engine configuration.

pub mod aggregate;
pub mod config;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use config::EngineConfig;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::AggregateId;
pub use money::{Money, Percentage, round2};
pub use value_object::ValueObject;
