//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stock lots, counters and reconciliation records are entities: they keep their
/// identity while their mutable fields move through optimistic writes.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
