// ABOUTME: Content store traits for status queries and blob access.
// ABOUTME: StatusSource feeds progress; ContentStore adds read/write of verified blobs.

use super::shared_types::{ActiveStatus, ContentInfo};
use crate::types::{Descriptor, Digest};
use async_trait::async_trait;
use bytes::Bytes;

/// Read-only transfer status queries, polled by the progress reporter.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Snapshot of transfers currently in flight.
    async fn active(&self) -> Result<Vec<ActiveStatus>, ContentError>;

    /// Metadata of committed content, `NotFound` when absent.
    async fn info(&self, digest: &Digest) -> Result<ContentInfo, ContentError>;
}

/// Content-addressable blob storage.
#[async_trait]
pub trait ContentStore: StatusSource {
    /// Check whether a blob is committed.
    async fn contains(&self, digest: &Digest) -> Result<bool, ContentError>;

    /// Read a committed blob in full.
    async fn read_blob(&self, digest: &Digest) -> Result<Bytes, ContentError>;

    /// Verify `data` against the descriptor and commit it.
    async fn write_blob(&self, descriptor: &Descriptor, data: Bytes) -> Result<(), ContentError>;
}

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("content not found: {0}")]
    NotFound(Digest),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },

    #[error("size mismatch for {digest}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        digest: Digest,
        expected: u64,
        actual: u64,
    },

    #[error("content store unavailable: {0}")]
    Unavailable(String),

    #[error("content store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("content store error: {0}")]
    Other(String),
}

impl ContentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContentError::NotFound(_))
    }

    /// The store cannot be reached at all; polling it again is pointless.
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, ContentError::Unavailable(_))
    }
}
