use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bonus_core::{Entity, Money, entity_id};
use bonus_parties::BrandId;

use crate::upload::UploadId;

entity_id!(
    /// Invoice identifier (internal; the natural key is `invoice_number`).
    InvoiceId
);

/// Document type, decided per upload by which number column is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceType {
    Invoice,
    CreditNote,
}

impl InvoiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceType::Invoice => "INVOICE",
            InvoiceType::CreditNote => "CREDIT_NOTE",
        }
    }

    /// Human label used in ledger descriptions.
    pub fn label(self) -> &'static str {
        match self {
            InvoiceType::Invoice => "Invoice",
            InvoiceType::CreditNote => "Credit Note",
        }
    }
}

impl core::fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invoice or credit note imported from the ERP.
///
/// Stored regardless of whether the client is registered in the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Globally unique document number.
    pub invoice_number: String,
    /// Customer number in the ERP; joins to `Client::client_number`.
    pub client_number: String,
    pub invoice_date: NaiveDate,
    pub total_amount: Money,
    pub invoice_type: InvoiceType,
    /// The upload that last wrote this invoice.
    pub upload_id: UploadId,
    pub created_at: DateTime<Utc>,
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Part of an invoice attributable to one brand. Unique per `(invoice, brand)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceBrandTurnover {
    pub invoice_id: InvoiceId,
    pub brand_id: BrandId,
    pub amount: Money,
}
