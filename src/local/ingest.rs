// ABOUTME: Streaming blob writer that verifies content before committing it.
// ABOUTME: Registers itself in the active table so progress can be polled while writing.

use crate::runtime::traits::{ActiveStatus, ContentError};
use crate::types::{Descriptor, Digest, digest::SHA256};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

pub(super) type ActiveTable = Arc<Mutex<HashMap<String, ActiveStatus>>>;

/// Wall-clock commit times of blobs written since the store was opened.
pub(super) type CommitTable = Arc<Mutex<HashMap<Digest, DateTime<Utc>>>>;

/// An in-progress write of one blob.
///
/// Data goes to a temp file under `ingest/` and is renamed into `blobs/` by
/// `commit` once its digest and size check out. Dropping an uncommitted
/// writer discards the temp file.
pub struct IngestWriter {
    descriptor: Descriptor,
    key: String,
    file: tokio::fs::File,
    temp: PathBuf,
    dest: PathBuf,
    hasher: Sha256,
    written: u64,
    active: ActiveTable,
    committed: CommitTable,
}

impl IngestWriter {
    pub(super) async fn create(
        descriptor: &Descriptor,
        temp: PathBuf,
        dest: PathBuf,
        active: ActiveTable,
        committed: CommitTable,
    ) -> Result<Self, ContentError> {
        if descriptor.digest.algorithm() != SHA256 {
            return Err(ContentError::Other(format!(
                "unsupported digest algorithm: {}",
                descriptor.digest.algorithm()
            )));
        }

        let file = tokio::fs::File::create(&temp).await?;
        let key = descriptor.ref_key();
        let now = Utc::now();
        active.lock().insert(
            key.clone(),
            ActiveStatus {
                key: key.clone(),
                offset: 0,
                total: descriptor.size,
                started_at: now,
                updated_at: now,
            },
        );

        Ok(Self {
            descriptor: descriptor.clone(),
            key,
            file,
            temp,
            dest,
            hasher: Sha256::new(),
            written: 0,
            active,
            committed,
        })
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Bytes written so far.
    pub fn offset(&self) -> u64 {
        self.written
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), ContentError> {
        self.file.write_all(chunk).await?;
        self.hasher.update(chunk);
        self.written += chunk.len() as u64;

        if let Some(status) = self.active.lock().get_mut(&self.key) {
            status.offset = self.written;
            status.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Verify size and digest, then move the blob into place.
    pub async fn commit(mut self) -> Result<(), ContentError> {
        self.file.flush().await?;
        self.file.sync_all().await?;

        if self.written != self.descriptor.size {
            return Err(ContentError::SizeMismatch {
                digest: self.descriptor.digest.clone(),
                expected: self.descriptor.size,
                actual: self.written,
            });
        }

        let actual = Digest::from_hasher(std::mem::take(&mut self.hasher));
        if actual != self.descriptor.digest {
            return Err(ContentError::DigestMismatch {
                expected: self.descriptor.digest.clone(),
                actual,
            });
        }

        tokio::fs::rename(&self.temp, &self.dest).await?;
        self.committed
            .lock()
            .insert(self.descriptor.digest.clone(), Utc::now());
        Ok(())
    }
}

impl Drop for IngestWriter {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
        let _ = std::fs::remove_file(&self.temp);
    }
}
