// ABOUTME: Directory-backed content store and image metadata service.
// ABOUTME: Blobs live under blobs/<alg>/<hex>, image records in images.json.

use super::ingest::{ActiveTable, CommitTable, IngestWriter};
use crate::runtime::traits::{
    ActiveStatus, ContentError, ContentInfo, ContentStore, ImageRecord, ImageStore,
    ImageStoreError, StatusSource,
};
use crate::types::{Descriptor, Digest, ImageRef};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const BLOBS_DIR: &str = "blobs";
const INGEST_DIR: &str = "ingest";
const IMAGES_FILE: &str = "images.json";

/// Local image store rooted at one directory.
pub struct LocalStore {
    root: PathBuf,
    active: ActiveTable,
    committed: CommitTable,
    images: Mutex<BTreeMap<String, ImageRecord>>,
    ingest_seq: AtomicU64,
}

impl LocalStore {
    /// Open (creating if needed) the store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(BLOBS_DIR))?;
        std::fs::create_dir_all(root.join(INGEST_DIR))?;

        let images = match std::fs::read(root.join(IMAGES_FILE)) {
            Ok(data) => {
                let records: Vec<ImageRecord> = serde_json::from_slice(&data)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                records
                    .into_iter()
                    .map(|record| (record.name.to_string(), record))
                    .collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };

        debug!(root = %root.display(), images = images.len(), "opened local store");
        Ok(Self {
            root,
            active: ActiveTable::default(),
            committed: CommitTable::default(),
            images: Mutex::new(images),
            ingest_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join(BLOBS_DIR)
            .join(digest.algorithm())
            .join(digest.hex())
    }

    /// Start writing `descriptor`. The blob becomes visible on commit.
    pub async fn writer(&self, descriptor: &Descriptor) -> Result<IngestWriter, ContentError> {
        let dest = self.blob_path(&descriptor.digest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.unavailable_or(e))?;
        }
        let seq = self.ingest_seq.fetch_add(1, Ordering::Relaxed);
        let temp = self
            .root
            .join(INGEST_DIR)
            .join(format!("{}-{}", descriptor.digest.hex(), seq));
        IngestWriter::create(
            descriptor,
            temp,
            dest,
            self.active.clone(),
            self.committed.clone(),
        )
        .await
    }

    fn unavailable_or(&self, err: io::Error) -> ContentError {
        if !self.root.exists() {
            ContentError::Unavailable(format!("store root {} is gone", self.root.display()))
        } else {
            ContentError::Io(err)
        }
    }

    /// Apply `change` to a copy of the records and persist it before
    /// making it visible.
    fn update_images<T>(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, ImageRecord>) -> Result<T, ImageStoreError>,
    ) -> Result<T, ImageStoreError> {
        let mut images = self.images.lock();
        let mut next = images.clone();
        let out = change(&mut next)?;
        self.persist_images(&next)?;
        *images = next;
        Ok(out)
    }

    fn persist_images(&self, images: &BTreeMap<String, ImageRecord>) -> Result<(), ImageStoreError> {
        let records: Vec<&ImageRecord> = images.values().collect();
        let data = serde_json::to_vec_pretty(&records)?;
        let path = self.root.join(IMAGES_FILE);
        let temp = self.root.join(format!("{IMAGES_FILE}.tmp"));
        std::fs::write(&temp, data)?;
        std::fs::rename(&temp, &path)?;
        Ok(())
    }
}

#[async_trait]
impl StatusSource for LocalStore {
    async fn active(&self) -> Result<Vec<ActiveStatus>, ContentError> {
        let mut active: Vec<ActiveStatus> = self.active.lock().values().cloned().collect();
        active.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(active)
    }

    /// `created_at` is the commit time for blobs written by this process and
    /// the file mtime for older ones.
    async fn info(&self, digest: &Digest) -> Result<ContentInfo, ContentError> {
        match tokio::fs::metadata(self.blob_path(digest)).await {
            Ok(meta) => {
                let committed = self.committed.lock().get(digest).copied();
                let created_at = match committed {
                    Some(at) => at,
                    None => DateTime::<Utc>::from(meta.modified()?),
                };
                Ok(ContentInfo {
                    digest: digest.clone(),
                    size: meta.len(),
                    created_at,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.root.exists() {
                    Err(ContentError::NotFound(digest.clone()))
                } else {
                    Err(self.unavailable_or(e))
                }
            }
            Err(e) => Err(self.unavailable_or(e)),
        }
    }
}

#[async_trait]
impl ContentStore for LocalStore {
    async fn contains(&self, digest: &Digest) -> Result<bool, ContentError> {
        tokio::fs::try_exists(self.blob_path(digest))
            .await
            .map_err(|e| self.unavailable_or(e))
    }

    async fn read_blob(&self, digest: &Digest) -> Result<Bytes, ContentError> {
        match tokio::fs::read(self.blob_path(digest)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ContentError::NotFound(digest.clone()))
            }
            Err(e) => Err(self.unavailable_or(e)),
        }
    }

    async fn write_blob(&self, descriptor: &Descriptor, data: Bytes) -> Result<(), ContentError> {
        if self.contains(&descriptor.digest).await? {
            return Ok(());
        }
        let mut writer = self.writer(descriptor).await?;
        writer.write(&data).await?;
        writer.commit().await
    }
}

#[async_trait]
impl ImageStore for LocalStore {
    async fn get(&self, reference: &ImageRef) -> Result<ImageRecord, ImageStoreError> {
        let name = reference.to_string();
        self.images
            .lock()
            .get(&name)
            .cloned()
            .ok_or(ImageStoreError::NotFound(name))
    }

    async fn create(&self, record: ImageRecord) -> Result<ImageRecord, ImageStoreError> {
        self.update_images(|images| {
            let name = record.name.to_string();
            if images.contains_key(&name) {
                return Err(ImageStoreError::AlreadyExists(name));
            }
            images.insert(name, record.clone());
            Ok(record)
        })
    }

    async fn delete(&self, reference: &ImageRef) -> Result<(), ImageStoreError> {
        let name = reference.to_string();
        self.update_images(|images| match images.remove(&name) {
            Some(_) => Ok(()),
            None => Err(ImageStoreError::NotFound(name.clone())),
        })
    }

    async fn list(&self) -> Result<Vec<ImageRecord>, ImageStoreError> {
        Ok(self.images.lock().values().cloned().collect())
    }
}
