//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. `Money`, date
/// ranges and prorated targets are value objects; to "modify" one, build a new
/// one.
///
/// ```ignore
/// let a = Money::from_minor(10_000);
/// let b = Money::from_major(100);
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
