//! Grouping of parsed lines into documents and brand attribution.

use chrono::NaiveDate;

use bonus_core::{DomainError, DomainResult, Money};
use bonus_parties::{BrandCatalog, BrandId};

use crate::rows::InvoiceRow;

/// All lines of one document, ready to be upserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDraft {
    pub invoice_number: String,
    /// Taken from the first line; lines of one document are assumed to agree.
    pub client_number: String,
    /// Taken from the first line.
    pub invoice_date: NaiveDate,
    pub total_amount: Money,
    pub lines: Vec<InvoiceRow>,
}

impl InvoiceDraft {
    /// Per-brand totals of this document.
    ///
    /// Brands whose matched lines sum to zero (or match nothing) are left out,
    /// so "does this invoice touch this brand" can be answered by presence.
    pub fn brand_turnovers(&self, catalog: &BrandCatalog) -> DomainResult<Vec<(BrandId, Money)>> {
        let mut turnovers = Vec::new();
        for brand in catalog.brands() {
            let amount = Money::checked_sum(
                self.lines
                    .iter()
                    .filter(|line| brand.matches(&line.item_code))
                    .map(|line| line.amount),
            )
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "turnover of brand {} on document {} is out of range",
                    brand.name, self.invoice_number
                ))
            })?;
            if !amount.is_zero() {
                turnovers.push((brand.id, amount));
            }
        }
        Ok(turnovers)
    }
}

/// Group lines by document number, keeping the order in which documents
/// first appear in the file.
///
/// Fails when a document total leaves the representable range.
pub fn group_by_document(rows: Vec<InvoiceRow>) -> DomainResult<Vec<InvoiceDraft>> {
    let mut drafts: Vec<InvoiceDraft> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for row in rows {
        match index.get(&row.document_number) {
            Some(&pos) => {
                let draft = &mut drafts[pos];
                draft.total_amount = draft.total_amount.checked_add(row.amount).ok_or_else(|| {
                    DomainError::validation(format!(
                        "total of document {} is out of range (line {})",
                        row.document_number, row.line
                    ))
                })?;
                draft.lines.push(row);
            }
            None => {
                index.insert(row.document_number.clone(), drafts.len());
                drafts.push(InvoiceDraft {
                    invoice_number: row.document_number.clone(),
                    client_number: row.client_number.clone(),
                    invoice_date: row.date,
                    total_amount: row.amount,
                    lines: vec![row],
                });
            }
        }
    }

    Ok(drafts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonus_parties::Brand;
    use proptest::prelude::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn line(number: &str, client: &str, code: &str, minor: i64, day: u32) -> InvoiceRow {
        InvoiceRow {
            line: 0,
            client_number: client.into(),
            amount: Money::from_minor(minor),
            item_code: code.into(),
            date: d(day),
            document_number: number.into(),
        }
    }

    #[test]
    fn groups_in_first_seen_order_with_header_from_first_line() {
        let drafts = group_by_document(vec![
            line("FV-2", "200", "A1", 1_000, 5),
            line("FV-1", "100", "A1", 500, 1),
            line("FV-2", "999", "B1", 250, 9),
        ])
        .unwrap();

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].invoice_number, "FV-2");
        assert_eq!(drafts[0].client_number, "200");
        assert_eq!(drafts[0].invoice_date, d(5));
        assert_eq!(drafts[0].total_amount, Money::from_minor(1_250));
        assert_eq!(drafts[1].invoice_number, "FV-1");
    }

    #[test]
    fn brand_turnovers_skip_brands_without_amount() {
        let alpha = Brand::new(Default::default(), "Alpha", "A").unwrap();
        let beta = Brand::new(Default::default(), "Beta", "B").unwrap();
        let gamma = Brand::new(Default::default(), "Gamma", "G").unwrap();
        let catalog = BrandCatalog::new(vec![alpha.clone(), beta.clone(), gamma]);

        let drafts = group_by_document(vec![
            line("FV-1", "100", "A1", 1_000, 1),
            line("FV-1", "100", "A2", 500, 1),
            line("FV-1", "100", "B1", 300, 1),
            line("FV-1", "100", "B2", -300, 1),
            line("FV-1", "100", "X9", 77, 1),
        ])
        .unwrap();

        let turnovers = drafts[0].brand_turnovers(&catalog).unwrap();
        assert_eq!(turnovers, vec![(alpha.id, Money::from_minor(1_500))]);
        assert_eq!(drafts[0].total_amount, Money::from_minor(1_577));
    }

    #[test]
    fn document_total_overflow_is_rejected() {
        let err = group_by_document(vec![
            line("FV-1", "100", "A1", i64::MAX, 1),
            line("FV-1", "100", "A1", 1, 1),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("document FV-1 is out of range"));
    }

    #[test]
    fn brand_turnover_overflow_is_rejected() {
        let alpha = Brand::new(Default::default(), "Alpha", "A").unwrap();
        let catalog = BrandCatalog::new(vec![alpha]);
        // The document total fits once the unmatched line is added, the brand subtotal does not.
        let draft = InvoiceDraft {
            invoice_number: "FV-1".into(),
            client_number: "100".into(),
            invoice_date: d(1),
            total_amount: Money::from_minor(i64::MAX - 1),
            lines: vec![
                line("FV-1", "100", "A1", i64::MAX, 1),
                line("FV-1", "100", "A2", 1, 1),
                line("FV-1", "100", "X9", -2, 1),
            ],
        };
        let err = draft.brand_turnovers(&catalog).unwrap_err();
        assert!(err.to_string().contains("brand Alpha"));
    }

    proptest! {
        /// Grouping never loses money: document totals add up to the line total.
        #[test]
        fn totals_are_preserved(amounts in prop::collection::vec((0usize..4, -10_000i64..10_000), 1..40)) {
            let rows: Vec<InvoiceRow> = amounts
                .iter()
                .map(|(doc, minor)| line(&format!("FV-{doc}"), "1", "A", *minor, 1))
                .collect();
            let expected: Money = rows.iter().map(|r| r.amount).sum();

            let drafts = group_by_document(rows).unwrap();
            let grouped: Money = drafts.iter().map(|d| d.total_amount).sum();
            prop_assert_eq!(grouped, expected);
            prop_assert!(drafts.len() <= 4);
        }
    }
}
