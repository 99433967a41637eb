//! `bonus-core`: foundation types shared by every bonus-program crate.
//!
//! This crate contains **pure domain** primitives (no IO, no storage, no clock).

pub mod dates;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use dates::{DateRange, add_months};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{EntityId, UserId};
pub use money::Money;
pub use value_object::ValueObject;
