//! Invoice ledger rows and the pure half of invoice ingestion.
//!
//! Column validation, row parsing, grouping by document number and brand
//! attribution live here as deterministic functions; persisting the results
//! is the job of `bonus-infra`.

pub mod grouping;
pub mod invoice;
pub mod rows;
pub mod upload;

pub use grouping::{InvoiceDraft, group_by_document};
pub use invoice::{Invoice, InvoiceBrandTurnover, InvoiceId, InvoiceType};
pub use rows::{Column, InvoiceRow, RawRow, RowRejection, detect_document_type, parse_rows};
pub use upload::{FATAL_PREFIX, FileUpload, UploadId, UploadStatus};
