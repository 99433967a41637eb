//! Repository traits and their in-memory implementations.
//!
//! Each trait is the seam a database adapter would implement. The in-memory
//! stores guard their maps with `RwLock`; every write that must be atomic
//! (invoice + brand turnovers, idempotent ledger insert, evaluation insert)
//! happens under a single write lock.

mod evaluations;
mod invoices;
mod ledger;
mod registry;
mod uploads;

pub use evaluations::{EvaluationStore, InMemoryEvaluationStore};
pub use invoices::{InMemoryInvoiceStore, InvoiceStore, InvoiceWrite, TurnoverRow};
pub use ledger::{InMemoryPointsLedger, PointsLedger};
pub use registry::{InMemoryRegistry, Registry};
pub use uploads::{InMemoryUploadStore, UploadStore};

use std::collections::HashMap;

use bonus_core::{DomainError, Entity};

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// The record changed between read and write.
    #[error("concurrent modification: {0}")]
    Conflict(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

/// Insert or replace a record keyed by its entity id.
fn put<E: Entity>(map: &mut HashMap<E::Id, E>, record: E) {
    map.insert(record.id().clone(), record);
}
