// ABOUTME: Pull implementation: resolve, walk the manifest graph, and download blobs.
// ABOUTME: Blobs stream through verified ingests so progress is visible while downloading.

use super::client::{MAX_CONCURRENT_TRANSFERS, RegistryClient, Session, check};
use super::auth::network_error;
use crate::runtime::traits::{
    ContentStore, DiscoveryHandler, ImageRecord, ImageStore, ImageStoreError, ResolverOptions,
    TransferError,
};
use crate::types::manifest::{self, Index, Manifest};
use crate::types::{Descriptor, Digest, ImageRef, Platform, media_types};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, info};

/// Media types offered when fetching manifests.
const MANIFEST_ACCEPT: &[&str] = &[
    media_types::OCI_INDEX,
    media_types::DOCKER_MANIFEST_LIST,
    media_types::OCI_MANIFEST,
    media_types::DOCKER_MANIFEST,
];

impl RegistryClient {
    pub(super) async fn pull_image(
        &self,
        image: &ImageRef,
        handler: DiscoveryHandler<'_>,
        options: &ResolverOptions,
    ) -> Result<ImageRecord, TransferError> {
        let session = self.session(image, options, "pull");
        let platform = options.platform.clone().unwrap_or_else(Platform::host);

        let (root, data) = self.fetch_manifest(&session, &image.reference()).await?;
        if let Some(pinned) = image.digest()
            && *pinned != root.digest
        {
            return Err(TransferError::Resolve {
                reference: image.to_string(),
                message: format!("registry returned {} for pinned digest {}", root.digest, pinned),
            });
        }
        info!(image = %image, digest = %root.digest, media_type = %root.media_type, "resolved image");
        handler(&root);
        if root.is_schema1() {
            return Err(manifest::ManifestError::UnsupportedMediaType(root.media_type).into());
        }

        let (manifest_desc, manifest_data) = if root.is_index() {
            let index = Index::parse(&data, &root.media_type)?;
            let child = index
                .manifests
                .into_iter()
                .find(|child| child.platform.as_ref().is_some_and(|p| platform.matches(p)))
                .ok_or_else(|| TransferError::NoMatchingPlatform(platform.to_string()))?;
            handler(&child);
            self.store.write_blob(&root, data).await?;

            let (fetched, child_data) = self.fetch_manifest(&session, child.digest.as_str()).await?;
            if fetched.digest != child.digest {
                return Err(TransferError::Resolve {
                    reference: image.to_string(),
                    message: format!("manifest {} does not match index entry", child.digest),
                });
            }
            let child = Descriptor {
                media_type: fetched.media_type,
                ..child
            };
            self.store.write_blob(&child, child_data.clone()).await?;
            (child, child_data)
        } else if root.is_manifest() {
            self.store.write_blob(&root, data.clone()).await?;
            (root.clone(), data)
        } else {
            return Err(manifest::ManifestError::UnsupportedMediaType(root.media_type).into());
        };

        let manifest = Manifest::parse(&manifest_data, &manifest_desc.media_type)?;
        let mut blobs = Vec::with_capacity(manifest.layers.len() + 1);
        blobs.push(manifest.config);
        blobs.extend(manifest.layers);
        for blob in &blobs {
            handler(blob);
        }

        stream::iter(blobs.iter().map(|blob| self.fetch_blob(&session, blob)).collect::<Vec<_>>())
            .buffer_unordered(MAX_CONCURRENT_TRANSFERS)
            .try_collect::<Vec<()>>()
            .await?;

        let record = ImageRecord::new(image.clone(), root);
        let record = match self.store.create(record.clone()).await {
            Err(ImageStoreError::AlreadyExists(_)) => {
                self.store.delete(image).await?;
                self.store.create(record).await?
            }
            other => other?,
        };
        info!(image = %image, "stored image");
        Ok(record)
    }

    /// GET a manifest by tag or digest. Returns its descriptor and body.
    async fn fetch_manifest(
        &self,
        session: &Session<'_>,
        reference: &str,
    ) -> Result<(Descriptor, Bytes), TransferError> {
        let url = session.url(&format!("manifests/{reference}"));
        let accept = MANIFEST_ACCEPT.join(", ");
        let response = session
            .send(|| session.http().get(&url).header(ACCEPT, &accept))
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(TransferError::Resolve {
                reference: session.image.to_string(),
                message: format!("manifest {reference} not found"),
            });
        }
        let response = check(response).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let data = response.bytes().await.map_err(network_error)?;

        let media_type = match content_type {
            Some(ct) if media_types::is_index(&ct) || media_types::is_manifest(&ct) => ct,
            Some(ct) if ct == media_types::DOCKER_SCHEMA1_MANIFEST => ct,
            _ => manifest::sniff_media_type(&data).ok_or_else(|| TransferError::Resolve {
                reference: session.image.to_string(),
                message: "cannot determine manifest media type".to_string(),
            })?,
        };

        Ok((Descriptor::new(media_type, Digest::sha256(&data), data.len() as u64), data))
    }

    /// Stream one blob into the store unless it is already there.
    async fn fetch_blob(&self, session: &Session<'_>, blob: &Descriptor) -> Result<(), TransferError> {
        if self.store.contains(&blob.digest).await? {
            debug!(digest = %blob.digest, "blob already present");
            return Ok(());
        }

        let url = session.url(&format!("blobs/{}", blob.digest));
        let response = check(session.send(|| session.http().get(&url)).await?).await?;

        let mut writer = self.store.writer(blob).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(network_error)?;
            writer.write(&chunk).await?;
        }
        writer.commit().await?;
        debug!(digest = %blob.digest, size = blob.size, "downloaded blob");
        Ok(())
    }
}
