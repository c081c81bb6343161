//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values:
/// `Money(43.20)` equals any other `Money(43.20)`, while two orders with the
/// same lines are still different orders.
///
/// To "modify" a value object, build a new one (e.g. `price.round2()`).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
