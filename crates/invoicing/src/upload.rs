//! Upload batch record and its processing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bonus_core::{DomainError, DomainResult, Entity, UserId, entity_id};

entity_id!(
    /// Upload batch identifier.
    UploadId
);

/// Processing lifecycle of an upload.
///
/// `Pending -> Processing -> Completed | Failed`; a finished batch may be
/// started again (ingestion is idempotent), a running one may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Prefix of the error message stored on a batch that failed as a whole.
pub const FATAL_PREFIX: &str = "Fatal error processing upload: ";

/// One uploaded invoice/credit-note file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    pub id: UploadId,
    pub file_name: String,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub status: UploadStatus,
    /// Number of data rows in the file.
    pub total_rows: usize,
    /// Number of documents ingested successfully.
    pub processed_rows: usize,
    /// Newline-joined per-document errors, or the fatal error.
    pub error_message: String,
}

impl FileUpload {
    pub fn new(
        id: UploadId,
        file_name: impl Into<String>,
        uploaded_by: UserId,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            uploaded_by,
            uploaded_at,
            processed_at: None,
            status: UploadStatus::Pending,
            total_rows: 0,
            processed_rows: 0,
            error_message: String::new(),
        }
    }

    pub fn start_processing(&mut self) -> DomainResult<()> {
        match self.status {
            UploadStatus::Pending | UploadStatus::Failed | UploadStatus::Completed => {
                self.status = UploadStatus::Processing;
                self.processed_rows = 0;
                self.error_message.clear();
                self.processed_at = None;
                Ok(())
            }
            UploadStatus::Processing => Err(DomainError::conflict(format!(
                "upload {} is already being processed",
                self.id
            ))),
        }
    }

    pub fn complete(
        &mut self,
        processed_rows: usize,
        errors: &[String],
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_processing()?;
        self.status = UploadStatus::Completed;
        self.processed_rows = processed_rows;
        self.error_message = errors.join("\n");
        self.processed_at = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, error: &str, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_processing()?;
        self.status = UploadStatus::Failed;
        self.error_message = format!("{FATAL_PREFIX}{error}");
        self.processed_at = Some(at);
        Ok(())
    }

    fn ensure_processing(&self) -> DomainResult<()> {
        if self.status != UploadStatus::Processing {
            return Err(DomainError::invariant(format!(
                "upload {} is not being processed (status: {:?})",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

impl Entity for FileUpload {
    type Id = UploadId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
