//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Clients, contracts, invoices, ledger entries and evaluations are entities:
/// two records with the same values but different ids are different records.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
