use serde::{Deserialize, Serialize};

use crate::transaction::{PointsTransaction, TransactionStatus};

/// Confirmed balance and pending ("incoming") points of one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBalance {
    /// Sum of CONFIRMED values.
    pub confirmed: i64,
    /// Sum of PENDING values.
    pub pending: i64,
}

impl PointsBalance {
    /// Fold transactions into a balance. Cancelled and no-contract entries are
    /// ignored.
    pub fn from_transactions<'a, I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = &'a PointsTransaction>,
    {
        transactions
            .into_iter()
            .fold(PointsBalance::default(), |mut acc, tx| {
                acc.record(tx.status, tx.value);
                acc
            })
    }

    pub fn record(&mut self, status: TransactionStatus, value: i64) {
        match status {
            TransactionStatus::Confirmed => self.confirmed += value,
            TransactionStatus::Pending => self.pending += value,
            TransactionStatus::Cancelled | TransactionStatus::NoContract => {}
        }
    }
}
