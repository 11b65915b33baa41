// ABOUTME: Image metadata store trait.
// ABOUTME: Named image records pointing at a target descriptor.

use super::shared_types::ImageRecord;
use crate::types::ImageRef;
use async_trait::async_trait;

/// Image metadata: get, create, delete, list.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Look up an image record by name.
    async fn get(&self, reference: &ImageRef) -> Result<ImageRecord, ImageStoreError>;

    /// Create a record, `AlreadyExists` if the name is taken.
    async fn create(&self, record: ImageRecord) -> Result<ImageRecord, ImageStoreError>;

    /// Delete a record, `NotFound` if absent.
    async fn delete(&self, reference: &ImageRef) -> Result<(), ImageStoreError>;

    /// All records, sorted by name.
    async fn list(&self) -> Result<Vec<ImageRecord>, ImageStoreError>;
}

/// Errors from image store operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("image already exists: {0}")]
    AlreadyExists(String),

    #[error("image store unavailable: {0}")]
    Unavailable(String),

    #[error("image store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt image records: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImageStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ImageStoreError::NotFound(_))
    }
}
