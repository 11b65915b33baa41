// ABOUTME: In-memory upload tracker used as the status source while pushing.
// ABOUTME: The registry client records upload progress; the reporter polls it.

use crate::runtime::traits::{ActiveStatus, ContentError, ContentInfo, StatusSource};
use crate::types::{Descriptor, Digest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Upload {
    InFlight(ActiveStatus),
    Committed { size: u64, at: DateTime<Utc> },
    /// Already present in the registry, nothing sent.
    Existing { size: u64 },
}

/// Per-push record of blob uploads keyed by digest.
#[derive(Debug, Default)]
pub struct PushTracker {
    uploads: Mutex<HashMap<Digest, Upload>>,
}

impl PushTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// An upload of `descriptor` has begun.
    pub fn start(&self, descriptor: &Descriptor) {
        let now = Utc::now();
        self.uploads.lock().insert(
            descriptor.digest.clone(),
            Upload::InFlight(ActiveStatus {
                key: descriptor.ref_key(),
                offset: 0,
                total: descriptor.size,
                started_at: now,
                updated_at: now,
            }),
        );
    }

    /// Bytes sent so far for an in-flight upload.
    pub fn progress(&self, digest: &Digest, offset: u64) {
        if let Some(Upload::InFlight(status)) = self.uploads.lock().get_mut(digest) {
            status.offset = offset;
            status.updated_at = Utc::now();
        }
    }

    /// The registry accepted the blob.
    pub fn commit(&self, descriptor: &Descriptor) {
        self.uploads.lock().insert(
            descriptor.digest.clone(),
            Upload::Committed {
                size: descriptor.size,
                at: Utc::now(),
            },
        );
    }

    /// The registry already had the blob.
    pub fn exists(&self, descriptor: &Descriptor) {
        self.uploads.lock().insert(
            descriptor.digest.clone(),
            Upload::Existing {
                size: descriptor.size,
            },
        );
    }

    /// Forget an upload that failed so the next attempt starts clean.
    pub fn abort(&self, digest: &Digest) {
        let mut uploads = self.uploads.lock();
        if matches!(uploads.get(digest), Some(Upload::InFlight(_))) {
            uploads.remove(digest);
        }
    }

    /// Drop every in-flight upload, keeping finished ones.
    pub fn abort_all(&self) {
        self.uploads
            .lock()
            .retain(|_, upload| !matches!(upload, Upload::InFlight(_)));
    }
}

#[async_trait]
impl StatusSource for PushTracker {
    async fn active(&self) -> Result<Vec<ActiveStatus>, ContentError> {
        let uploads = self.uploads.lock();
        let mut active: Vec<ActiveStatus> = uploads
            .values()
            .filter_map(|upload| match upload {
                Upload::InFlight(status) => Some(status.clone()),
                _ => None,
            })
            .collect();
        active.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(active)
    }

    async fn info(&self, digest: &Digest) -> Result<ContentInfo, ContentError> {
        match self.uploads.lock().get(digest) {
            Some(Upload::Committed { size, at }) => Ok(ContentInfo {
                digest: digest.clone(),
                size: *size,
                created_at: *at,
            }),
            Some(Upload::Existing { size }) => Ok(ContentInfo {
                digest: digest.clone(),
                size: *size,
                created_at: DateTime::<Utc>::MIN_UTC,
            }),
            _ => Err(ContentError::NotFound(digest.clone())),
        }
    }
}
