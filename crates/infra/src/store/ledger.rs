use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use bonus_core::DateRange;
use bonus_ledger::{
    IdempotencyKey, NewTransaction, PointsBalance, PointsTransaction, TransactionId,
    TransactionStatus,
};
use bonus_parties::ClientId;

use super::StoreError;

/// The append-only points ledger.
pub trait PointsLedger: Send + Sync {
    /// Append unconditionally.
    fn append(&self, tx: NewTransaction, now: DateTime<Utc>) -> Result<PointsTransaction, StoreError>;

    /// Append unless an entry with the same idempotency key exists; the check
    /// and the insert are atomic. Returns `None` when skipped.
    fn insert_unique(
        &self,
        tx: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Option<PointsTransaction>, StoreError>;

    fn get(&self, id: TransactionId) -> Result<Option<PointsTransaction>, StoreError>;

    /// A client's entries, oldest first.
    fn transactions_for_client(&self, client_id: ClientId) -> Result<Vec<PointsTransaction>, StoreError>;

    /// Change one entry's status, enforcing the transition rules.
    fn set_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<PointsTransaction, StoreError>;

    /// Atomically move every entry with status `from` dated within `range` to
    /// `to`. Returns the updated entries.
    fn transition_all(
        &self,
        range: DateRange,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<Vec<PointsTransaction>, StoreError>;

    /// Confirmed and pending totals, recomputed from the entries.
    fn summary(&self, client_id: ClientId) -> Result<PointsBalance, StoreError> {
        Ok(PointsBalance::from_transactions(
            &self.transactions_for_client(client_id)?,
        ))
    }

    /// Sum of CONFIRMED values.
    fn balance(&self, client_id: ClientId) -> Result<i64, StoreError> {
        Ok(self.summary(client_id)?.confirmed)
    }

    /// Sum of PENDING values.
    fn incoming(&self, client_id: ClientId) -> Result<i64, StoreError> {
        Ok(self.summary(client_id)?.pending)
    }
}

impl<S> PointsLedger for Arc<S>
where
    S: PointsLedger + ?Sized,
{
    fn append(&self, tx: NewTransaction, now: DateTime<Utc>) -> Result<PointsTransaction, StoreError> {
        (**self).append(tx, now)
    }

    fn insert_unique(
        &self,
        tx: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Option<PointsTransaction>, StoreError> {
        (**self).insert_unique(tx, now)
    }

    fn get(&self, id: TransactionId) -> Result<Option<PointsTransaction>, StoreError> {
        (**self).get(id)
    }

    fn transactions_for_client(&self, client_id: ClientId) -> Result<Vec<PointsTransaction>, StoreError> {
        (**self).transactions_for_client(client_id)
    }

    fn set_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<PointsTransaction, StoreError> {
        (**self).set_status(id, status)
    }

    fn transition_all(
        &self,
        range: DateRange,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<Vec<PointsTransaction>, StoreError> {
        (**self).transition_all(range, from, to)
    }

    fn summary(&self, client_id: ClientId) -> Result<PointsBalance, StoreError> {
        (**self).summary(client_id)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Insertion order.
    entries: Vec<PointsTransaction>,
    index: HashMap<TransactionId, usize>,
    keys: HashSet<IdempotencyKey>,
}

impl LedgerState {
    fn push(&mut self, tx: NewTransaction, now: DateTime<Utc>) -> PointsTransaction {
        let record = tx.into_transaction(TransactionId::new(), now);
        self.keys.insert(record.idempotency_key());
        self.index.insert(record.id, self.entries.len());
        self.entries.push(record.clone());
        record
    }
}

/// In-memory ledger for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPointsLedger {
    inner: RwLock<LedgerState>,
}

impl InMemoryPointsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every entry, in insertion order.
    pub fn all(&self) -> Result<Vec<PointsTransaction>, StoreError> {
        Ok(self.inner.read()?.entries.clone())
    }
}

impl PointsLedger for InMemoryPointsLedger {
    fn append(&self, tx: NewTransaction, now: DateTime<Utc>) -> Result<PointsTransaction, StoreError> {
        Ok(self.inner.write()?.push(tx, now))
    }

    fn insert_unique(
        &self,
        tx: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Option<PointsTransaction>, StoreError> {
        let mut state = self.inner.write()?;
        if state.keys.contains(&tx.idempotency_key()) {
            return Ok(None);
        }
        Ok(Some(state.push(tx, now)))
    }

    fn get(&self, id: TransactionId) -> Result<Option<PointsTransaction>, StoreError> {
        let state = self.inner.read()?;
        Ok(state.index.get(&id).map(|&pos| state.entries[pos].clone()))
    }

    fn transactions_for_client(&self, client_id: ClientId) -> Result<Vec<PointsTransaction>, StoreError> {
        let state = self.inner.read()?;
        Ok(state
            .entries
            .iter()
            .filter(|t| t.client_id == client_id)
            .cloned()
            .collect())
    }

    fn set_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<PointsTransaction, StoreError> {
        let mut state = self.inner.write()?;
        let pos = *state
            .index
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {id}")))?;
        let entry = &mut state.entries[pos];
        entry.transition_to(status)?;
        Ok(entry.clone())
    }

    fn transition_all(
        &self,
        range: DateRange,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<Vec<PointsTransaction>, StoreError> {
        let mut state = self.inner.write()?;
        if !from.can_transition_to(to) {
            return Err(StoreError::Domain(bonus_core::DomainError::conflict(format!(
                "cannot move transactions from {from:?} to {to:?}"
            ))));
        }

        let mut updated = Vec::new();
        for entry in state
            .entries
            .iter_mut()
            .filter(|t| t.status == from && range.contains(t.date))
        {
            entry.status = to;
            updated.push(entry.clone());
        }
        Ok(updated)
    }
}
