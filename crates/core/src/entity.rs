//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stores key persisted records by this identifier; the record itself may
/// change freely while the id stays stable and is never reused.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
