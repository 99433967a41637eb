//! Column layout of the ERP export and row-level parsing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use bonus_core::{DomainError, DomainResult, Money};

use crate::invoice::InvoiceType;

/// Logical columns of an invoice export, with the header used by the ERP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    ClientNumber,
    Amount,
    ItemCode,
    Date,
    InvoiceNumber,
    CreditNoteNumber,
}

impl Column {
    pub const REQUIRED: [Column; 4] = [
        Column::ClientNumber,
        Column::Amount,
        Column::ItemCode,
        Column::Date,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::ClientNumber => "ZČ",
            Column::Amount => "Cena",
            Column::ItemCode => "Kód",
            Column::Date => "Datum",
            Column::InvoiceNumber => "Faktura",
            Column::CreditNoteNumber => "Dobropis",
        }
    }

    /// Column holding the document number for a document type.
    pub fn document_number(kind: InvoiceType) -> Column {
        match kind {
            InvoiceType::Invoice => Column::InvoiceNumber,
            InvoiceType::CreditNote => Column::CreditNoteNumber,
        }
    }

    /// Position of this column in a header row.
    pub fn position<S: AsRef<str>>(self, headers: &[S]) -> Option<usize> {
        headers.iter().position(|h| h.as_ref().trim() == self.header())
    }
}

/// Validate a header row and decide the document type of the whole upload.
///
/// Exactly one of the invoice-number / credit-note-number columns must be
/// present, and every required column must exist. Either failure is fatal for
/// the batch.
pub fn detect_document_type<S: AsRef<str>>(headers: &[S]) -> DomainResult<InvoiceType> {
    let has_invoice = Column::InvoiceNumber.position(headers).is_some();
    let has_credit_note = Column::CreditNoteNumber.position(headers).is_some();

    let kind = match (has_invoice, has_credit_note) {
        (true, false) => InvoiceType::Invoice,
        (false, true) => InvoiceType::CreditNote,
        _ => {
            return Err(DomainError::validation(format!(
                "need exactly one of column '{}' or '{}', not both or none",
                Column::InvoiceNumber.header(),
                Column::CreditNoteNumber.header()
            )));
        }
    };

    let missing: Vec<&str> = Column::REQUIRED
        .iter()
        .filter(|c| c.position(headers).is_none())
        .map(|c| c.header())
        .collect();
    if !missing.is_empty() {
        return Err(DomainError::validation(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }

    Ok(kind)
}

/// One line of the export, as text, after column mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// 1-based data line number, for diagnostics.
    pub line: usize,
    pub client_number: String,
    pub amount: String,
    pub item_code: String,
    pub date: String,
    pub document_number: String,
}

/// A validated line of an invoice or credit note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRow {
    pub line: usize,
    pub client_number: String,
    pub amount: Money,
    pub item_code: String,
    pub date: NaiveDate,
    pub document_number: String,
}

/// A line dropped during parsing. Not fatal for the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    pub line: usize,
    pub reason: String,
}

impl core::fmt::Display for RowRejection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "row {}: {}", self.line, self.reason)
    }
}

/// Parse raw lines, dropping (and reporting) the ones that cannot be used.
///
/// `date_format` is a `chrono` format string, `%d.%m.%Y` for the ERP export.
pub fn parse_rows(raw: Vec<RawRow>, date_format: &str) -> (Vec<InvoiceRow>, Vec<RowRejection>) {
    let mut rows = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();

    for row in raw {
        match parse_row(&row, date_format) {
            Ok(parsed) => rows.push(parsed),
            Err(reason) => rejected.push(RowRejection {
                line: row.line,
                reason,
            }),
        }
    }

    (rows, rejected)
}

fn parse_row(row: &RawRow, date_format: &str) -> Result<InvoiceRow, String> {
    let date = NaiveDate::parse_from_str(row.date.trim(), date_format)
        .map_err(|e| format!("invalid date '{}': {e}", row.date))?;

    let document_number = row.document_number.trim();
    if document_number.is_empty() {
        return Err("missing document number".to_string());
    }

    let amount = Money::parse(&row.amount).map_err(|e| e.to_string())?;

    Ok(InvoiceRow {
        line: row.line,
        client_number: row.client_number.trim().to_string(),
        amount,
        item_code: row.item_code.trim().to_string(),
        date,
        document_number: document_number.to_string(),
    })
}
