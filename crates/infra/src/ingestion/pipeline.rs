use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use bonus_invoicing::{
    Column, FileUpload, InvoiceType, RawRow, UploadId, detect_document_type, group_by_document,
    parse_rows,
};

use super::IngestionError;
use super::source::{RowSource, RowTable};
use crate::accrual::{AccrualProcessor, AccrualStats};
use crate::config::BonusConfig;
use crate::observer::{IngestionObserver, NoopObserver};
use crate::store::{InvoiceStore, InvoiceWrite, PointsLedger, Registry, StoreError, UploadStore};

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub upload_id: UploadId,
    pub document_type: InvoiceType,
    pub total_rows: usize,
    pub rows_rejected: usize,
    pub invoices_processed: usize,
    pub accrual: AccrualStats,
    /// Per-row and per-invoice errors, in the order they occurred.
    pub errors: Vec<String>,
}

/// Runs one upload through parsing, invoice upsert and points accrual.
///
/// Re-running the same file is safe: invoices are upserted by number, brand
/// turnover by `(invoice, brand)`, and ledger entries are keyed by their
/// idempotency tuple.
pub struct IngestionPipeline<R, I, L, U> {
    registry: R,
    invoices: I,
    uploads: U,
    accrual: AccrualProcessor<R, I, L>,
    config: BonusConfig,
    observer: Arc<dyn IngestionObserver>,
}

impl<R, I, L, U> IngestionPipeline<R, I, L, U>
where
    R: Registry + Clone,
    I: InvoiceStore + Clone,
    L: PointsLedger,
    U: UploadStore,
{
    pub fn new(registry: R, invoices: I, ledger: L, uploads: U, config: BonusConfig) -> Self {
        Self {
            accrual: AccrualProcessor::new(registry.clone(), invoices.clone(), ledger),
            registry,
            invoices,
            uploads,
            config,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Process a registered upload.
    ///
    /// A fatal error marks the upload FAILED (message prefixed
    /// `Fatal error processing upload: `) and is returned; per-row and
    /// per-invoice errors only end up in the report and on the upload.
    pub fn run(
        &self,
        upload_id: UploadId,
        source: &mut dyn RowSource,
        now: DateTime<Utc>,
    ) -> Result<IngestionReport, IngestionError> {
        let upload = self
            .uploads
            .get(upload_id)?
            .ok_or(IngestionError::UploadNotFound(upload_id))?;
        info!(upload_id = %upload_id, file = %upload.file_name, "starting to process upload");

        self.uploads.update(upload_id, |u| {
            u.start_processing().map_err(StoreError::from)
        })?;

        match self.process(upload_id, source, now) {
            Ok(report) => {
                let mut processed_errors = report.errors.clone();
                processed_errors.extend(report.accrual.errors.iter().cloned());
                self.uploads.update(upload_id, |u| {
                    u.complete(report.invoices_processed, &processed_errors, now)
                        .map_err(StoreError::from)
                })?;
                info!(
                    upload_id = %upload_id,
                    invoices = report.invoices_processed,
                    points_transactions = report.accrual.transactions_created,
                    "processing completed"
                );
                Ok(report)
            }
            Err(e) => {
                error!(upload_id = %upload_id, error = %e, "fatal error processing upload");
                let message = e.to_string();
                self.uploads.update(upload_id, |u| {
                    u.fail(&message, now).map_err(StoreError::from)
                })?;
                Err(e)
            }
        }
    }

    /// Register a new upload and run it.
    pub fn ingest(
        &self,
        upload: FileUpload,
        source: &mut dyn RowSource,
        now: DateTime<Utc>,
    ) -> Result<IngestionReport, IngestionError> {
        self.uploads.save(&upload)?;
        self.run(upload.id, source, now)
    }

    fn process(
        &self,
        upload_id: UploadId,
        source: &mut dyn RowSource,
        now: DateTime<Utc>,
    ) -> Result<IngestionReport, IngestionError> {
        let table = source.read_table()?;
        let document_type = detect_document_type(&table.headers).map_err(IngestionError::Input)?;
        info!(upload_id = %upload_id, document_type = %document_type, rows = table.records.len(), "file read");

        let total_rows = table.records.len();
        self.uploads.update(upload_id, |u| {
            u.total_rows = total_rows;
            Ok(())
        })?;

        let raw = raw_rows(&table, document_type)?;
        let (rows, rejected) = parse_rows(raw, &self.config.date_format);
        let mut errors: Vec<String> = Vec::new();
        for rejection in &rejected {
            warn!(upload_id = %upload_id, line = rejection.line, reason = %rejection.reason, "dropping row");
            errors.push(rejection.to_string());
        }

        let catalog = self.registry.brand_catalog()?;
        let drafts = group_by_document(rows).map_err(IngestionError::Input)?;
        let total = drafts.len();
        info!(upload_id = %upload_id, invoices = total, "found unique invoices in file");

        let mut processed = 0;
        for (i, draft) in drafts.into_iter().enumerate() {
            let number = draft.invoice_number.clone();
            let result = if draft.client_number.is_empty() {
                Err(StoreError::Domain(bonus_core::DomainError::validation(
                    "missing client number",
                )))
            } else {
                draft
                    .brand_turnovers(&catalog)
                    .map_err(StoreError::from)
                    .and_then(|turnovers| {
                        self.invoices.upsert_invoice(
                            InvoiceWrite {
                                invoice_number: draft.invoice_number,
                                client_number: draft.client_number,
                                invoice_date: draft.invoice_date,
                                total_amount: draft.total_amount,
                                invoice_type: document_type,
                                upload_id,
                            },
                            &turnovers,
                            now,
                        )
                    })
            };

            match result {
                Ok(_) => {
                    processed += 1;
                    info!(invoice_number = %number, "processed invoice");
                }
                Err(e) => {
                    error!(invoice_number = %number, error = %e, "error processing invoice");
                    errors.push(format!("Error processing invoice {number}: {e}"));
                }
            }
            self.observer.on_progress(i + 1, total);
        }

        let accrual = self
            .accrual
            .accrue_upload(upload_id, self.observer.as_ref(), now)?;

        Ok(IngestionReport {
            upload_id,
            document_type,
            total_rows,
            rows_rejected: rejected.len(),
            invoices_processed: processed,
            accrual,
            errors,
        })
    }
}

/// Map records to logical columns. Headers were validated already, so a
/// missing position here is an internal inconsistency reported as input error.
fn raw_rows(table: &RowTable, document_type: InvoiceType) -> Result<Vec<RawRow>, IngestionError> {
    let position = |column: Column| {
        column.position(&table.headers).ok_or_else(|| {
            IngestionError::Input(bonus_core::DomainError::validation(format!(
                "missing required columns: {}",
                column.header()
            )))
        })
    };
    let client = position(Column::ClientNumber)?;
    let amount = position(Column::Amount)?;
    let item = position(Column::ItemCode)?;
    let date = position(Column::Date)?;
    let number = position(Column::document_number(document_type))?;

    let cell = |record: &[String], idx: usize| record.get(idx).cloned().unwrap_or_default();

    Ok(table
        .records
        .iter()
        .enumerate()
        .map(|(i, record)| RawRow {
            line: i + 1,
            client_number: cell(record, client),
            amount: cell(record, amount),
            item_code: cell(record, item),
            date: cell(record, date),
            document_number: cell(record, number),
        })
        .collect())
}
