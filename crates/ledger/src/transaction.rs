use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bonus_core::{DomainError, DomainResult, Entity, entity_id};
use bonus_invoicing::{InvoiceId, UploadId};
use bonus_parties::{BrandId, ClientId};

entity_id!(
    /// Points transaction identifier.
    TransactionId
);

entity_id!(
    /// Reward redemption request identifier (requests live outside this workspace).
    RewardRequestId
);

/// Why a ledger entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Points accrued from an invoice.
    StandardPoints,
    /// Points spent on a reward.
    RewardClaim,
    /// Points taken back for a credit note.
    CreditNoteAdjust,
    /// Manual correction.
    Adjustment,
    /// Bonus from an extra goal evaluation.
    ExtraPoints,
}

/// Lifecycle state of a ledger entry. Only `Confirmed` entries count toward
/// the balance; `Pending` entries are "incoming".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "CONFIRMED")]
    Confirmed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "NO-CONTRACT")]
    NoContract,
}

impl TransactionStatus {
    /// Allowed status changes. Values are never touched by a transition.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Cancelled, Confirmed)
                | (NoContract, Confirmed)
                | (NoContract, Cancelled)
        )
    }
}

/// Fields that identify an accrual: re-running accrual for the same tuple
/// must not produce a second entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub client_id: ClientId,
    pub date: NaiveDate,
    pub brand_id: Option<BrandId>,
    pub transaction_type: TransactionType,
    pub invoice_id: Option<InvoiceId>,
}

/// Input for appending a ledger entry; id and timestamp are assigned on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub client_id: ClientId,
    pub value: i64,
    pub date: NaiveDate,
    pub description: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub brand_id: Option<BrandId>,
    pub invoice_id: Option<InvoiceId>,
    pub reward_request_id: Option<RewardRequestId>,
    pub upload_id: Option<UploadId>,
}

impl NewTransaction {
    pub fn new(
        client_id: ClientId,
        value: i64,
        date: NaiveDate,
        description: impl Into<String>,
        transaction_type: TransactionType,
        status: TransactionStatus,
    ) -> Self {
        Self {
            client_id,
            value,
            date,
            description: description.into(),
            transaction_type,
            status,
            brand_id: None,
            invoice_id: None,
            reward_request_id: None,
            upload_id: None,
        }
    }

    pub fn with_brand(mut self, brand_id: BrandId) -> Self {
        self.brand_id = Some(brand_id);
        self
    }

    pub fn with_invoice(mut self, invoice_id: InvoiceId) -> Self {
        self.invoice_id = Some(invoice_id);
        self
    }

    pub fn with_upload(mut self, upload_id: UploadId) -> Self {
        self.upload_id = Some(upload_id);
        self
    }

    pub fn with_reward_request(mut self, reward_request_id: RewardRequestId) -> Self {
        self.reward_request_id = Some(reward_request_id);
        self
    }

    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey {
            client_id: self.client_id,
            date: self.date,
            brand_id: self.brand_id,
            transaction_type: self.transaction_type,
            invoice_id: self.invoice_id,
        }
    }

    pub fn into_transaction(self, id: TransactionId, created_at: DateTime<Utc>) -> PointsTransaction {
        PointsTransaction {
            id,
            client_id: self.client_id,
            value: self.value,
            date: self.date,
            description: self.description,
            transaction_type: self.transaction_type,
            status: self.status,
            brand_id: self.brand_id,
            invoice_id: self.invoice_id,
            reward_request_id: self.reward_request_id,
            upload_id: self.upload_id,
            created_at,
        }
    }
}

/// A ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsTransaction {
    pub id: TransactionId,
    pub client_id: ClientId,
    /// Signed point value.
    pub value: i64,
    pub date: NaiveDate,
    pub description: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub brand_id: Option<BrandId>,
    pub invoice_id: Option<InvoiceId>,
    pub reward_request_id: Option<RewardRequestId>,
    pub upload_id: Option<UploadId>,
    pub created_at: DateTime<Utc>,
}

impl PointsTransaction {
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey {
            client_id: self.client_id,
            date: self.date,
            brand_id: self.brand_id,
            transaction_type: self.transaction_type,
            invoice_id: self.invoice_id,
        }
    }

    /// Move to `next`, enforcing [`TransactionStatus::can_transition_to`].
    pub fn transition_to(&mut self, next: TransactionStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::conflict(format!(
                "transaction {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

impl Entity for PointsTransaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
