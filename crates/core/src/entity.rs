//! Records with identity: two products with equal fields are still two products.

/// A domain record addressed by its id (products, tax rates, customers,
/// addresses, carriers, promotions, credit notes).
pub trait Entity {
    /// Ids are small copyable keys, ordered for deterministic iteration.
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Owned copy of the id, for use as a map key.
    fn key(&self) -> Self::Id {
        *self.id()
    }
}
