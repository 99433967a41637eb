//! Points ledger (append-only, status-tagged).
//!
//! Pure domain logic only: transaction records, status transition rules, the
//! idempotency key used by accrual, and balance arithmetic.

pub mod balance;
pub mod transaction;

pub use balance::PointsBalance;
pub use transaction::{
    IdempotencyKey, NewTransaction, PointsTransaction, RewardRequestId, TransactionId,
    TransactionStatus, TransactionType,
};
