//! Net turnover queries over imported invoices.

use std::collections::BTreeMap;

use bonus_core::{DateRange, Money};
use bonus_invoicing::InvoiceType;
use bonus_parties::{BrandId, Client};

use crate::store::{InvoiceStore, StoreError, TurnoverRow};

/// Invoices minus credit notes, per client, brand set and inclusive date range.
#[derive(Debug, Clone)]
pub struct TurnoverAggregator<I> {
    invoices: I,
}

impl<I: InvoiceStore> TurnoverAggregator<I> {
    pub fn new(invoices: I) -> Self {
        Self { invoices }
    }

    /// Net turnover for `brands`; zero when nothing matches.
    pub fn turnover(
        &self,
        client: &Client,
        brands: &[BrandId],
        range: DateRange,
    ) -> Result<Money, StoreError> {
        let rows = self.invoices.turnover_rows(&client.client_number, range)?;
        Ok(net(rows.iter().filter(|r| brands.contains(&r.brand_id))))
    }

    /// Net turnover of every brand the client bought within `range`.
    pub fn turnover_by_brand(
        &self,
        client: &Client,
        range: DateRange,
    ) -> Result<BTreeMap<BrandId, Money>, StoreError> {
        let mut by_brand: BTreeMap<BrandId, Money> = BTreeMap::new();
        for row in self.invoices.turnover_rows(&client.client_number, range)? {
            *by_brand.entry(row.brand_id).or_insert(Money::ZERO) += signed(&row);
        }
        Ok(by_brand)
    }
}

fn signed(row: &TurnoverRow) -> Money {
    match row.invoice_type {
        InvoiceType::Invoice => row.amount,
        InvoiceType::CreditNote => -row.amount,
    }
}

fn net<'a>(rows: impl Iterator<Item = &'a TurnoverRow>) -> Money {
    rows.map(signed).sum()
}
