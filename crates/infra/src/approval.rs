//! Monthly approval of pending points and single-entry status changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

use bonus_core::DateRange;
use bonus_ledger::{PointsTransaction, TransactionId, TransactionStatus};
use bonus_parties::ClientId;

use crate::observer::{LedgerObserver, NoopObserver};
use crate::store::{PointsLedger, StoreError};

/// What one monthly approval confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub transaction_count: usize,
    pub total_points: i64,
    pub per_client: BTreeMap<ClientId, i64>,
}

pub struct ApprovalService<L> {
    ledger: L,
    observer: Arc<dyn LedgerObserver>,
}

impl<L: PointsLedger> ApprovalService<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LedgerObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Confirm every PENDING entry dated in the given calendar month, then
    /// notify each affected client once with their new balance.
    pub fn approve_month(&self, year: i32, month: u32) -> Result<ApprovalSummary, StoreError> {
        let range = DateRange::month(year, month)?;
        let confirmed = self.ledger.transition_all(
            range,
            TransactionStatus::Pending,
            TransactionStatus::Confirmed,
        )?;

        let mut per_client: BTreeMap<ClientId, i64> = BTreeMap::new();
        for tx in &confirmed {
            *per_client.entry(tx.client_id).or_default() += tx.value;
        }

        for (&client_id, &points) in &per_client {
            match self.ledger.balance(client_id) {
                Ok(balance) => self.observer.on_transactions_confirmed(client_id, points, balance),
                Err(e) => warn!(client_id = %client_id, error = %e, "could not read balance for notification"),
            }
        }

        let summary = ApprovalSummary {
            start: range.start(),
            end: range.end(),
            transaction_count: confirmed.len(),
            total_points: confirmed.iter().map(|t| t.value).sum(),
            per_client,
        };
        info!(
            start = %summary.start,
            end = %summary.end,
            transactions = summary.transaction_count,
            points = summary.total_points,
            "approved pending points"
        );
        Ok(summary)
    }

    pub fn confirm(&self, id: TransactionId) -> Result<PointsTransaction, StoreError> {
        let tx = self.ledger.set_status(id, TransactionStatus::Confirmed)?;
        info!(transaction_id = %id, value = tx.value, "transaction confirmed");
        Ok(tx)
    }

    pub fn cancel(&self, id: TransactionId) -> Result<PointsTransaction, StoreError> {
        let tx = self.ledger.set_status(id, TransactionStatus::Cancelled)?;
        info!(transaction_id = %id, value = tx.value, "transaction cancelled");
        Ok(tx)
    }
}

/// The month approved by default: `lag_months` before the month of `today`.
pub fn default_approval_month(today: NaiveDate, lag_months: u32) -> (i32, u32) {
    let first = today.with_day(1).unwrap_or(today);
    let target = first.checked_sub_months(Months::new(lag_months)).unwrap_or(first);
    (target.year(), target.month())
}
