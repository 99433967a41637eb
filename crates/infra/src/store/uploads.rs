use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bonus_invoicing::{FileUpload, UploadId};

use super::StoreError;

/// Upload batch records.
pub trait UploadStore: Send + Sync {
    fn save(&self, upload: &FileUpload) -> Result<(), StoreError>;
    fn get(&self, id: UploadId) -> Result<Option<FileUpload>, StoreError>;

    /// Load, mutate and store an upload under one write lock, so two callers
    /// cannot both move it into processing.
    fn update<F>(&self, id: UploadId, f: F) -> Result<FileUpload, StoreError>
    where
        F: FnOnce(&mut FileUpload) -> Result<(), StoreError>,
        Self: Sized;
}

impl<S> UploadStore for Arc<S>
where
    S: UploadStore,
{
    fn save(&self, upload: &FileUpload) -> Result<(), StoreError> {
        (**self).save(upload)
    }

    fn get(&self, id: UploadId) -> Result<Option<FileUpload>, StoreError> {
        (**self).get(id)
    }

    fn update<F>(&self, id: UploadId, f: F) -> Result<FileUpload, StoreError>
    where
        F: FnOnce(&mut FileUpload) -> Result<(), StoreError>,
    {
        (**self).update(id, f)
    }
}

/// In-memory upload store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUploadStore {
    inner: RwLock<HashMap<UploadId, FileUpload>>,
}

impl InMemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl UploadStore for InMemoryUploadStore {
    fn save(&self, upload: &FileUpload) -> Result<(), StoreError> {
        let mut uploads = self.inner.write()?;
        super::put(&mut *uploads, upload.clone());
        Ok(())
    }

    fn get(&self, id: UploadId) -> Result<Option<FileUpload>, StoreError> {
        Ok(self.inner.read()?.get(&id).cloned())
    }

    fn update<F>(&self, id: UploadId, f: F) -> Result<FileUpload, StoreError>
    where
        F: FnOnce(&mut FileUpload) -> Result<(), StoreError>,
    {
        let mut uploads = self.inner.write()?;
        let upload = uploads
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("upload {id}")))?;
        let mut draft = upload.clone();
        f(&mut draft)?;
        *upload = draft.clone();
        Ok(draft)
    }
}
