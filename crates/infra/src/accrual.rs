//! Points accrual: invoice brand turnover -> ledger entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use bonus_core::DateRange;
use bonus_invoicing::{Invoice, InvoiceType, UploadId};
use bonus_ledger::{NewTransaction, TransactionStatus, TransactionType};
use bonus_parties::{Client, Contract, select_active_contract};

use crate::observer::IngestionObserver;
use crate::store::{InvoiceStore, PointsLedger, Registry, StoreError};

/// Counters of one accrual run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccrualStats {
    pub invoices_found: usize,
    pub invoices_processed: usize,
    pub transactions_created: usize,
    /// Entries that already existed for the same idempotency key.
    pub transactions_skipped: usize,
    /// Brand turnovers with no bonus rule in the contract.
    pub brands_without_bonus: usize,
    pub errors: Vec<String>,
}

impl AccrualStats {
    fn absorb(&mut self, outcome: InvoiceAccrual) {
        self.invoices_processed += 1;
        self.transactions_created += outcome.created;
        self.transactions_skipped += outcome.skipped;
        self.brands_without_bonus += outcome.brands_without_bonus;
    }
}

#[derive(Debug, Default)]
struct InvoiceAccrual {
    created: usize,
    skipped: usize,
    brands_without_bonus: usize,
}

/// Creates ledger entries for imported invoices under the client's contract.
#[derive(Debug, Clone)]
pub struct AccrualProcessor<R, I, L> {
    registry: R,
    invoices: I,
    ledger: L,
}

impl<R, I, L> AccrualProcessor<R, I, L>
where
    R: Registry,
    I: InvoiceStore,
    L: PointsLedger,
{
    pub fn new(registry: R, invoices: I, ledger: L) -> Self {
        Self {
            registry,
            invoices,
            ledger,
        }
    }

    /// Accrue points for the invoices written by one upload.
    ///
    /// Unknown clients and invoices outside any active contract are skipped
    /// silently. A failing invoice is recorded in `errors` and does not stop
    /// the run.
    pub fn accrue_upload(
        &self,
        upload_id: UploadId,
        observer: &dyn IngestionObserver,
        now: DateTime<Utc>,
    ) -> Result<AccrualStats, StoreError> {
        let invoices = self.invoices.invoices_for_upload(upload_id)?;
        let mut stats = AccrualStats {
            invoices_found: invoices.len(),
            ..AccrualStats::default()
        };
        info!(upload_id = %upload_id, invoices = invoices.len(), "accruing points for upload");

        for invoice in &invoices {
            match self.accrue_from_upload(invoice, observer, now) {
                Ok(Some(outcome)) => stats.absorb(outcome),
                Ok(None) => {}
                Err(e) => {
                    let msg = format!(
                        "Error processing points for invoice {}: {e}",
                        invoice.invoice_number
                    );
                    error!(invoice_number = %invoice.invoice_number, error = %e, "accrual failed");
                    stats.errors.push(msg);
                }
            }
        }

        info!(
            upload_id = %upload_id,
            created = stats.transactions_created,
            skipped = stats.transactions_skipped,
            "points accrual finished"
        );
        Ok(stats)
    }

    /// Retroactively accrue a newly onboarded client's already imported
    /// invoices dated within `contract`.
    pub fn accrue_historical(
        &self,
        client: &Client,
        contract: &Contract,
        observer: &dyn IngestionObserver,
        now: DateTime<Utc>,
    ) -> Result<AccrualStats, StoreError> {
        let window = DateRange::new(contract.date_from, contract.date_to)?;
        let invoices = self.invoices.invoices_for_client(&client.client_number, window)?;
        let mut stats = AccrualStats {
            invoices_found: invoices.len(),
            ..AccrualStats::default()
        };
        info!(
            client_number = %client.client_number,
            invoices = invoices.len(),
            "found historical invoices"
        );

        if invoices.is_empty() {
            return Ok(stats);
        }
        if !contract.has_bonuses() {
            warn!(contract_id = %contract.id, "no brand bonuses configured for contract");
            stats
                .errors
                .push("No brand bonuses configured for this contract".to_string());
            return Ok(stats);
        }

        for invoice in &invoices {
            match self.accrue_invoice(client, contract, invoice, observer, now) {
                Ok(outcome) => {
                    if outcome.created == 0 {
                        debug!(
                            invoice_number = %invoice.invoice_number,
                            "invoice processed, no transactions created"
                        );
                    }
                    stats.absorb(outcome);
                }
                Err(e) => {
                    error!(invoice_number = %invoice.invoice_number, error = %e, "historical accrual failed");
                    stats.errors.push(format!(
                        "Error processing invoice {}: {e}",
                        invoice.invoice_number
                    ));
                }
            }
        }

        Ok(stats)
    }

    /// Resolve client and contract for an uploaded invoice; `None` when the
    /// invoice earns nothing.
    fn accrue_from_upload(
        &self,
        invoice: &Invoice,
        observer: &dyn IngestionObserver,
        now: DateTime<Utc>,
    ) -> Result<Option<InvoiceAccrual>, StoreError> {
        let Some(client) = self.registry.client_by_number(&invoice.client_number)? else {
            debug!(client_number = %invoice.client_number, "no client for client number, skipping points");
            return Ok(None);
        };

        let contracts = self.registry.contracts_for_client(client.id)?;
        let Some(contract) = select_active_contract(&contracts, client.id, invoice.invoice_date)? else {
            debug!(
                client_number = %client.client_number,
                date = %invoice.invoice_date,
                "no active contract on invoice date"
            );
            return Ok(None);
        };

        if !contract.has_bonuses() {
            debug!(client_number = %client.client_number, "contract has no brand bonuses, skipping");
            return Ok(None);
        }

        self.accrue_invoice(&client, contract, invoice, observer, now)
            .map(Some)
    }

    fn accrue_invoice(
        &self,
        client: &Client,
        contract: &Contract,
        invoice: &Invoice,
        observer: &dyn IngestionObserver,
        now: DateTime<Utc>,
    ) -> Result<InvoiceAccrual, StoreError> {
        let mut outcome = InvoiceAccrual::default();

        for turnover in self.invoices.brand_turnovers(invoice.id)? {
            let Some(bonus) = contract.bonus_for(turnover.brand_id) else {
                outcome.brands_without_bonus += 1;
                continue;
            };

            let points = bonus.points_for(turnover.amount);
            if points == 0 {
                continue;
            }

            let (value, transaction_type, status) = match invoice.invoice_type {
                InvoiceType::Invoice => (
                    points,
                    TransactionType::StandardPoints,
                    TransactionStatus::Pending,
                ),
                InvoiceType::CreditNote => (
                    -points,
                    TransactionType::CreditNoteAdjust,
                    TransactionStatus::Confirmed,
                ),
            };

            let tx = NewTransaction::new(
                client.id,
                value,
                invoice.invoice_date,
                format!("{} {}", invoice.invoice_type.label(), invoice.invoice_number),
                transaction_type,
                status,
            )
            .with_brand(turnover.brand_id)
            .with_invoice(invoice.id)
            .with_upload(invoice.upload_id);

            match self.ledger.insert_unique(tx, now)? {
                Some(created) => {
                    outcome.created += 1;
                    observer.on_points_created(&created);
                }
                None => {
                    outcome.skipped += 1;
                    debug!(
                        invoice_number = %invoice.invoice_number,
                        brand_id = %turnover.brand_id,
                        "skipping duplicate transaction"
                    );
                }
            }
        }

        Ok(outcome)
    }
}
