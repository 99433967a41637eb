use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};

use bonus_core::{DateRange, Money};
use bonus_invoicing::{Invoice, InvoiceBrandTurnover, InvoiceId, InvoiceType, UploadId};
use bonus_parties::BrandId;

use super::StoreError;

/// Header fields written for one document during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceWrite {
    pub invoice_number: String,
    pub client_number: String,
    pub invoice_date: NaiveDate,
    pub total_amount: Money,
    pub invoice_type: InvoiceType,
    pub upload_id: UploadId,
}

/// One brand-turnover row joined with its invoice header, as read by the
/// turnover aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnoverRow {
    pub invoice_id: InvoiceId,
    pub invoice_date: NaiveDate,
    pub invoice_type: InvoiceType,
    pub brand_id: BrandId,
    pub amount: Money,
}

/// Imported invoices and their per-brand turnover.
pub trait InvoiceStore: Send + Sync {
    /// Upsert an invoice by number together with its brand turnovers, as one
    /// unit of work.
    ///
    /// The invoice keeps its id on update. Turnover rows are upserted per
    /// `(invoice, brand)`; rows for brands not in `turnovers` are left as they
    /// are.
    fn upsert_invoice(
        &self,
        write: InvoiceWrite,
        turnovers: &[(BrandId, Money)],
        now: DateTime<Utc>,
    ) -> Result<Invoice, StoreError>;

    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;
    fn invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>, StoreError>;
    /// Invoices last written by this upload.
    fn invoices_for_upload(&self, upload_id: UploadId) -> Result<Vec<Invoice>, StoreError>;
    /// Invoices of a customer number dated within `range`.
    fn invoices_for_client(
        &self,
        client_number: &str,
        range: DateRange,
    ) -> Result<Vec<Invoice>, StoreError>;
    fn brand_turnovers(&self, invoice_id: InvoiceId) -> Result<Vec<InvoiceBrandTurnover>, StoreError>;
    /// All turnover rows of a customer number dated within `range`.
    fn turnover_rows(
        &self,
        client_number: &str,
        range: DateRange,
    ) -> Result<Vec<TurnoverRow>, StoreError>;
}

impl<S> InvoiceStore for Arc<S>
where
    S: InvoiceStore + ?Sized,
{
    fn upsert_invoice(
        &self,
        write: InvoiceWrite,
        turnovers: &[(BrandId, Money)],
        now: DateTime<Utc>,
    ) -> Result<Invoice, StoreError> {
        (**self).upsert_invoice(write, turnovers, now)
    }

    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        (**self).invoice(id)
    }

    fn invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>, StoreError> {
        (**self).invoice_by_number(invoice_number)
    }

    fn invoices_for_upload(&self, upload_id: UploadId) -> Result<Vec<Invoice>, StoreError> {
        (**self).invoices_for_upload(upload_id)
    }

    fn invoices_for_client(
        &self,
        client_number: &str,
        range: DateRange,
    ) -> Result<Vec<Invoice>, StoreError> {
        (**self).invoices_for_client(client_number, range)
    }

    fn brand_turnovers(&self, invoice_id: InvoiceId) -> Result<Vec<InvoiceBrandTurnover>, StoreError> {
        (**self).brand_turnovers(invoice_id)
    }

    fn turnover_rows(
        &self,
        client_number: &str,
        range: DateRange,
    ) -> Result<Vec<TurnoverRow>, StoreError> {
        (**self).turnover_rows(client_number, range)
    }
}

#[derive(Debug, Default)]
struct InvoiceState {
    invoices: HashMap<InvoiceId, Invoice>,
    by_number: HashMap<String, InvoiceId>,
    turnovers: HashMap<(InvoiceId, BrandId), Money>,
}

fn by_date_then_number(mut invoices: Vec<Invoice>) -> Vec<Invoice> {
    invoices.sort_by(|a, b| {
        (a.invoice_date, &a.invoice_number).cmp(&(b.invoice_date, &b.invoice_number))
    });
    invoices
}

/// In-memory invoice store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceStore {
    inner: RwLock<InvoiceState>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl InvoiceStore for InMemoryInvoiceStore {
    fn upsert_invoice(
        &self,
        write: InvoiceWrite,
        turnovers: &[(BrandId, Money)],
        now: DateTime<Utc>,
    ) -> Result<Invoice, StoreError> {
        let mut state = self.inner.write()?;

        let id = state
            .by_number
            .get(&write.invoice_number)
            .copied()
            .unwrap_or_else(InvoiceId::new);
        let created_at = state.invoices.get(&id).map_or(now, |existing| existing.created_at);

        let invoice = Invoice {
            id,
            invoice_number: write.invoice_number,
            client_number: write.client_number,
            invoice_date: write.invoice_date,
            total_amount: write.total_amount,
            invoice_type: write.invoice_type,
            upload_id: write.upload_id,
            created_at,
        };

        state.by_number.insert(invoice.invoice_number.clone(), id);
        state.invoices.insert(id, invoice.clone());
        for (brand_id, amount) in turnovers {
            state.turnovers.insert((id, *brand_id), *amount);
        }

        Ok(invoice)
    }

    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        Ok(self.inner.read()?.invoices.get(&id).cloned())
    }

    fn invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>, StoreError> {
        let state = self.inner.read()?;
        Ok(state
            .by_number
            .get(invoice_number)
            .and_then(|id| state.invoices.get(id))
            .cloned())
    }

    fn invoices_for_upload(&self, upload_id: UploadId) -> Result<Vec<Invoice>, StoreError> {
        let state = self.inner.read()?;
        let invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.upload_id == upload_id)
            .cloned()
            .collect();
        Ok(by_date_then_number(invoices))
    }

    fn invoices_for_client(
        &self,
        client_number: &str,
        range: DateRange,
    ) -> Result<Vec<Invoice>, StoreError> {
        let state = self.inner.read()?;
        let invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.client_number == client_number && range.contains(i.invoice_date))
            .cloned()
            .collect();
        Ok(by_date_then_number(invoices))
    }

    fn brand_turnovers(&self, invoice_id: InvoiceId) -> Result<Vec<InvoiceBrandTurnover>, StoreError> {
        let state = self.inner.read()?;
        let mut rows: Vec<InvoiceBrandTurnover> = state
            .turnovers
            .iter()
            .filter(|((id, _), _)| *id == invoice_id)
            .map(|((id, brand_id), amount)| InvoiceBrandTurnover {
                invoice_id: *id,
                brand_id: *brand_id,
                amount: *amount,
            })
            .collect();
        rows.sort_by_key(|r| r.brand_id);
        Ok(rows)
    }

    fn turnover_rows(
        &self,
        client_number: &str,
        range: DateRange,
    ) -> Result<Vec<TurnoverRow>, StoreError> {
        let state = self.inner.read()?;
        Ok(state
            .turnovers
            .iter()
            .filter_map(|((invoice_id, brand_id), amount)| {
                let invoice = state.invoices.get(invoice_id)?;
                (invoice.client_number == client_number && range.contains(invoice.invoice_date))
                    .then(|| TurnoverRow {
                        invoice_id: *invoice_id,
                        invoice_date: invoice.invoice_date,
                        invoice_type: invoice.invoice_type,
                        brand_id: *brand_id,
                        amount: *amount,
                    })
            })
            .collect())
    }
}
