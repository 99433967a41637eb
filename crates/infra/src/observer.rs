//! Post-operation callbacks.
//!
//! Invoked explicitly at the call sites that change the ledger, so
//! notification delivery (out of scope here) can hook in without the core
//! knowing about it.

use std::sync::Mutex;

use bonus_goals::GoalEvaluation;
use bonus_ledger::PointsTransaction;
use bonus_parties::ClientId;

/// Progress and accrual callbacks for an ingestion run.
pub trait IngestionObserver: Send + Sync {
    /// After each document, with the number handled so far and the total.
    fn on_progress(&self, _processed: usize, _total: usize) {}

    /// For every ledger entry created by accrual.
    fn on_points_created(&self, _transaction: &PointsTransaction) {}
}

/// Callbacks for ledger changes outside ingestion.
pub trait LedgerObserver: Send + Sync {
    /// Once per client after a monthly approval.
    fn on_transactions_confirmed(&self, _client_id: ClientId, _points: i64, _new_balance: i64) {}

    /// After each stored goal evaluation.
    fn on_goal_evaluated(&self, _evaluation: &GoalEvaluation) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IngestionObserver for NoopObserver {}
impl LedgerObserver for NoopObserver {}

/// Observer that records every callback, for tests and the CLI report.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    inner: Mutex<Recorded>,
}

#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub progress: Vec<(usize, usize)>,
    pub points_created: Vec<PointsTransaction>,
    pub confirmations: Vec<(ClientId, i64, i64)>,
    pub evaluations: Vec<GoalEvaluation>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> Recorded {
        match self.inner.lock() {
            Ok(recorded) => recorded.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with<F: FnOnce(&mut Recorded)>(&self, f: F) {
        match self.inner.lock() {
            Ok(mut recorded) => f(&mut recorded),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl IngestionObserver for RecordingObserver {
    fn on_progress(&self, processed: usize, total: usize) {
        self.with(|r| r.progress.push((processed, total)));
    }

    fn on_points_created(&self, transaction: &PointsTransaction) {
        self.with(|r| r.points_created.push(transaction.clone()));
    }
}

impl LedgerObserver for RecordingObserver {
    fn on_transactions_confirmed(&self, client_id: ClientId, points: i64, new_balance: i64) {
        self.with(|r| r.confirmations.push((client_id, points, new_balance)));
    }

    fn on_goal_evaluated(&self, evaluation: &GoalEvaluation) {
        self.with(|r| r.evaluations.push(evaluation.clone()));
    }
}
