// ABOUTME: The default image backend: a directory store plus a registry client.
// ABOUTME: Delegates each collaborator trait to the part that owns it.

use super::error::{ClientSnafu, OpenStoreSnafu, RuntimeError};
use super::traits::{
    ActiveStatus, ContentError, ContentInfo, ContentStore, DiscoveryHandler, ImageRecord,
    ImageStore, ImageStoreError, ResolverOptions, StatusSource, Transfer, TransferError,
};
use crate::local::LocalStore;
use crate::progress::PushTracker;
use crate::registry::{RegistryClient, RegistryOptions};
use crate::types::{Descriptor, Digest, ImageRef};
use async_trait::async_trait;
use bytes::Bytes;
use snafu::ResultExt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Local store and registry client sharing one content directory.
pub struct LocalRuntime {
    store: Arc<LocalStore>,
    registry: RegistryClient,
}

impl LocalRuntime {
    pub fn open(root: &Path, options: RegistryOptions) -> Result<Self, RuntimeError> {
        let store = Arc::new(LocalStore::open(root).context(OpenStoreSnafu { path: root })?);
        let registry = RegistryClient::new(store.clone(), options).context(ClientSnafu)?;
        info!(store = %root.display(), "opened local runtime");
        Ok(Self { store, registry })
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }
}

#[async_trait]
impl Transfer for LocalRuntime {
    async fn pull(
        &self,
        reference: &ImageRef,
        handler: DiscoveryHandler<'_>,
        options: &ResolverOptions,
    ) -> Result<ImageRecord, TransferError> {
        self.registry.pull(reference, handler, options).await
    }

    async fn push(
        &self,
        reference: &ImageRef,
        descriptor: &Descriptor,
        handler: DiscoveryHandler<'_>,
        options: &ResolverOptions,
        tracker: Arc<PushTracker>,
    ) -> Result<(), TransferError> {
        self.registry
            .push(reference, descriptor, handler, options, tracker)
            .await
    }
}

#[async_trait]
impl StatusSource for LocalRuntime {
    async fn active(&self) -> Result<Vec<ActiveStatus>, ContentError> {
        self.store.active().await
    }

    async fn info(&self, digest: &Digest) -> Result<ContentInfo, ContentError> {
        self.store.info(digest).await
    }
}

#[async_trait]
impl ContentStore for LocalRuntime {
    async fn contains(&self, digest: &Digest) -> Result<bool, ContentError> {
        self.store.contains(digest).await
    }

    async fn read_blob(&self, digest: &Digest) -> Result<Bytes, ContentError> {
        self.store.read_blob(digest).await
    }

    async fn write_blob(&self, descriptor: &Descriptor, data: Bytes) -> Result<(), ContentError> {
        self.store.write_blob(descriptor, data).await
    }
}

#[async_trait]
impl ImageStore for LocalRuntime {
    async fn get(&self, reference: &ImageRef) -> Result<ImageRecord, ImageStoreError> {
        self.store.get(reference).await
    }

    async fn create(&self, record: ImageRecord) -> Result<ImageRecord, ImageStoreError> {
        self.store.create(record).await
    }

    async fn delete(&self, reference: &ImageRef) -> Result<(), ImageStoreError> {
        self.store.delete(reference).await
    }

    async fn list(&self) -> Result<Vec<ImageRecord>, ImageStoreError> {
        self.store.list().await
    }
}
