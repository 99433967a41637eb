//! Invoice ingestion: rows -> invoices + brand turnover -> points.

mod pipeline;
mod source;

pub use pipeline::{IngestionPipeline, IngestionReport};
pub use source::{CsvRowSource, RowSource, RowTable, VecRowSource};

use bonus_core::DomainError;

use crate::store::StoreError;

/// Errors that fail a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Input(DomainError),
    #[error("upload {0} not found")]
    UploadNotFound(bonus_invoicing::UploadId),
    #[error(transparent)]
    Store(#[from] StoreError),
}
