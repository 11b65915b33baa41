// ABOUTME: Test support utilities.
// ABOUTME: In-memory image backend, recording progress sink, and image builders.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use imgferry::progress::{EventLevel, ProgressSink, PushTracker, StatusRow};
use imgferry::runtime::traits::{
    ActiveStatus, ContentError, ContentInfo, ContentStore, DiscoveryHandler, ImageRecord,
    ImageStore, ImageStoreError, ResolverOptions, StatusSource, Transfer, TransferError,
};
use imgferry::transfer::inspect;
use imgferry::types::{Descriptor, Digest, ImageRef, Platform, media_types};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("imgferry=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A manifest plus every blob it needs, ready to seed a backend.
#[derive(Debug, Clone)]
pub struct TestImage {
    pub target: Descriptor,
    pub blobs: Vec<(Descriptor, Bytes)>,
}

impl TestImage {
    /// A single-platform OCI image with the given layer contents.
    pub fn new(platform: &Platform, layers: &[&[u8]]) -> Self {
        let config = serde_json::json!({
            "architecture": platform.architecture,
            "os": platform.os,
            "config": {
                "Env": ["PATH=/usr/local/bin:/usr/bin"],
                "Cmd": ["sh"],
                "WorkingDir": "/app"
            }
        });
        let config_data = Bytes::from(serde_json::to_vec(&config).unwrap());
        let config_desc = Descriptor::for_blob(media_types::OCI_CONFIG, &config_data);

        let mut blobs = vec![(config_desc.clone(), config_data)];
        let mut layer_descs = Vec::new();
        for layer in layers {
            let data = Bytes::copy_from_slice(layer);
            let desc = Descriptor::for_blob(media_types::OCI_LAYER_GZIP, &data);
            layer_descs.push(desc.clone());
            blobs.push((desc, data));
        }

        let manifest = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": media_types::OCI_MANIFEST,
            "config": config_desc,
            "layers": layer_descs,
        });
        let manifest_data = Bytes::from(serde_json::to_vec(&manifest).unwrap());
        let target = Descriptor::for_blob(media_types::OCI_MANIFEST, &manifest_data);
        blobs.insert(0, (target.clone(), manifest_data));
        Self { target, blobs }
    }

    /// An index over one image per platform.
    pub fn index(images: &[(Platform, TestImage)]) -> Self {
        let manifests: Vec<Descriptor> = images
            .iter()
            .map(|(platform, image)| image.target.clone().with_platform(platform.clone()))
            .collect();
        let index = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": media_types::OCI_INDEX,
            "manifests": manifests,
        });
        let data = Bytes::from(serde_json::to_vec(&index).unwrap());
        let target = Descriptor::for_blob(media_types::OCI_INDEX, &data);
        let mut blobs = vec![(target.clone(), data)];
        for (_, image) in images {
            blobs.extend(image.blobs.iter().cloned());
        }
        Self { target, blobs }
    }

    pub fn layers(&self) -> Vec<&Descriptor> {
        self.blobs
            .iter()
            .map(|(d, _)| d)
            .filter(|d| d.media_type == media_types::OCI_LAYER_GZIP)
            .collect()
    }
}

pub fn linux_amd64() -> Platform {
    Platform::new("linux", "amd64")
}

pub fn linux_arm64() -> Platform {
    Platform::new("linux", "arm64")
}

/// In-memory backend with a scripted registry.
#[derive(Default)]
pub struct MemoryBackend {
    blobs: Mutex<HashMap<Digest, (Bytes, DateTime<Utc>)>>,
    images: Mutex<BTreeMap<String, ImageRecord>>,
    remote: Mutex<HashMap<String, TestImage>>,
    active: Mutex<Vec<ActiveStatus>>,
    push_failures: Mutex<VecDeque<TransferError>>,
    pushed: Mutex<Vec<(String, Descriptor)>>,
    pub push_calls: AtomicU32,
    pub pull_calls: AtomicU32,
    pub delete_calls: AtomicU32,
    fail_deletes: Mutex<bool>,
    unavailable: Mutex<bool>,
    pull_delay: Mutex<Option<Duration>>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `image` pullable as `reference`.
    pub fn publish(&self, reference: &str, image: &TestImage) {
        let name = ImageRef::parse(reference).unwrap().to_string();
        self.remote.lock().insert(name, image.clone());
    }

    /// Put `image` into the local store under `reference`.
    pub fn seed(&self, reference: &str, image: &TestImage) {
        for (desc, data) in &image.blobs {
            self.blobs
                .lock()
                .insert(desc.digest.clone(), (data.clone(), Utc::now()));
        }
        let name = ImageRef::parse(reference).unwrap();
        self.images
            .lock()
            .insert(name.to_string(), ImageRecord::new(name, image.target.clone()));
    }

    /// The next push attempts fail with these errors, in order.
    pub fn fail_pushes(&self, errors: impl IntoIterator<Item = TransferError>) {
        self.push_failures.lock().extend(errors);
    }

    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock() = true;
    }

    /// Every status query reports the store as gone.
    pub fn make_unavailable(&self) {
        *self.unavailable.lock() = true;
    }

    pub fn delay_pulls(&self, delay: Duration) {
        *self.pull_delay.lock() = Some(delay);
    }

    pub fn set_active(&self, active: Vec<ActiveStatus>) {
        *self.active.lock() = active;
    }

    pub fn pushed(&self) -> Vec<(String, Descriptor)> {
        self.pushed.lock().clone()
    }

    pub fn has_image(&self, reference: &str) -> bool {
        let name = ImageRef::parse(reference).unwrap().to_string();
        self.images.lock().contains_key(&name)
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.lock().len()
    }

    fn check_available(&self) -> Result<(), ContentError> {
        if *self.unavailable.lock() {
            return Err(ContentError::Unavailable("memory store closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Transfer for MemoryBackend {
    async fn pull(
        &self,
        reference: &ImageRef,
        handler: DiscoveryHandler<'_>,
        _options: &ResolverOptions,
    ) -> Result<ImageRecord, TransferError> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.pull_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let image = self
            .remote
            .lock()
            .get(&reference.to_string())
            .cloned()
            .ok_or_else(|| TransferError::Resolve {
                reference: reference.to_string(),
                message: "not found".to_string(),
            })?;

        for (desc, data) in &image.blobs {
            handler(desc);
            self.blobs
                .lock()
                .entry(desc.digest.clone())
                .or_insert_with(|| (data.clone(), Utc::now()));
        }

        let record = ImageRecord::new(reference.clone(), image.target.clone());
        self.images
            .lock()
            .insert(reference.to_string(), record.clone());
        Ok(record)
    }

    async fn push(
        &self,
        reference: &ImageRef,
        descriptor: &Descriptor,
        handler: DiscoveryHandler<'_>,
        _options: &ResolverOptions,
        tracker: Arc<PushTracker>,
    ) -> Result<(), TransferError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        let graph = inspect::walk(self, descriptor)
            .await
            .map_err(|e| TransferError::Other(e.to_string()))?;
        for desc in &graph {
            handler(desc);
        }

        let failure = self.push_failures.lock().pop_front();
        if let Some(err) = failure {
            if let Some(first) = graph.last() {
                tracker.start(first);
                tracker.progress(&first.digest, first.size / 2);
            }
            return Err(err);
        }

        for desc in graph.iter().rev() {
            tracker.start(desc);
            tracker.commit(desc);
        }
        self.pushed
            .lock()
            .push((reference.to_string(), descriptor.clone()));
        Ok(())
    }
}

#[async_trait]
impl StatusSource for MemoryBackend {
    async fn active(&self) -> Result<Vec<ActiveStatus>, ContentError> {
        self.check_available()?;
        Ok(self.active.lock().clone())
    }

    async fn info(&self, digest: &Digest) -> Result<ContentInfo, ContentError> {
        self.check_available()?;
        self.blobs
            .lock()
            .get(digest)
            .map(|(data, created_at)| ContentInfo {
                digest: digest.clone(),
                size: data.len() as u64,
                created_at: *created_at,
            })
            .ok_or_else(|| ContentError::NotFound(digest.clone()))
    }
}

#[async_trait]
impl ContentStore for MemoryBackend {
    async fn contains(&self, digest: &Digest) -> Result<bool, ContentError> {
        Ok(self.blobs.lock().contains_key(digest))
    }

    async fn read_blob(&self, digest: &Digest) -> Result<Bytes, ContentError> {
        self.blobs
            .lock()
            .get(digest)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| ContentError::NotFound(digest.clone()))
    }

    async fn write_blob(&self, descriptor: &Descriptor, data: Bytes) -> Result<(), ContentError> {
        let actual = Digest::sha256(&data);
        if actual != descriptor.digest {
            return Err(ContentError::DigestMismatch {
                expected: descriptor.digest.clone(),
                actual,
            });
        }
        self.blobs
            .lock()
            .entry(actual)
            .or_insert_with(|| (data, Utc::now()));
        Ok(())
    }
}

#[async_trait]
impl ImageStore for MemoryBackend {
    async fn get(&self, reference: &ImageRef) -> Result<ImageRecord, ImageStoreError> {
        let name = reference.to_string();
        self.images
            .lock()
            .get(&name)
            .cloned()
            .ok_or(ImageStoreError::NotFound(name))
    }

    async fn create(&self, record: ImageRecord) -> Result<ImageRecord, ImageStoreError> {
        let name = record.name.to_string();
        let mut images = self.images.lock();
        if images.contains_key(&name) {
            return Err(ImageStoreError::AlreadyExists(name));
        }
        images.insert(name, record.clone());
        Ok(record)
    }

    async fn delete(&self, reference: &ImageRef) -> Result<(), ImageStoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_deletes.lock() {
            return Err(ImageStoreError::Unavailable("delete refused".to_string()));
        }
        let name = reference.to_string();
        match self.images.lock().remove(&name) {
            Some(_) => Ok(()),
            None => Err(ImageStoreError::NotFound(name)),
        }
    }

    async fn list(&self) -> Result<Vec<ImageRecord>, ImageStoreError> {
        Ok(self.images.lock().values().cloned().collect())
    }
}

/// Keeps every snapshot and event it is given.
#[derive(Default)]
pub struct RecordingSink {
    renders: Mutex<Vec<Vec<StatusRow>>>,
    events: Mutex<Vec<(EventLevel, String, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn renders(&self) -> Vec<Vec<StatusRow>> {
        self.renders.lock().clone()
    }

    pub fn last_render(&self) -> Option<Vec<StatusRow>> {
        self.renders.lock().last().cloned()
    }

    pub fn events(&self) -> Vec<(EventLevel, String, String)> {
        self.events.lock().clone()
    }

    pub fn events_at(&self, level: EventLevel) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(l, _, _)| *l == level)
            .map(|(_, _, m)| m.clone())
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn render(&self, rows: &[StatusRow], _elapsed: Duration) {
        self.renders.lock().push(rows.to_vec());
    }

    fn event(&self, level: EventLevel, step: &str, message: &str) {
        self.events
            .lock()
            .push((level, step.to_string(), message.to_string()));
    }
}
