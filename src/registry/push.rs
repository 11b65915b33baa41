// ABOUTME: Push implementation: upload blobs, then manifests leaves-first.
// ABOUTME: Upload bodies are streamed in chunks so the tracker sees byte progress.

use super::client::{MAX_CONCURRENT_TRANSFERS, RegistryClient, Session, check};
use crate::progress::PushTracker;
use crate::runtime::traits::{ContentStore, DiscoveryHandler, ResolverOptions, TransferError};
use crate::transfer::inspect::{self, InspectError};
use crate::types::{Descriptor, Digest, ImageRef};
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt, stream};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use std::sync::Arc;
use tracing::{debug, info};

/// Size of each chunk handed to the HTTP body.
const UPLOAD_CHUNK: usize = 64 * 1024;

impl RegistryClient {
    pub(super) async fn push_image(
        &self,
        image: &ImageRef,
        root: &Descriptor,
        handler: DiscoveryHandler<'_>,
        options: &ResolverOptions,
        tracker: Arc<PushTracker>,
    ) -> Result<(), TransferError> {
        let session = self.session(image, options, "pull,push");
        let graph = inspect::walk(&*self.store, root)
            .await
            .map_err(inspect_error)?;
        for descriptor in &graph {
            handler(descriptor);
        }

        let (manifests, blobs): (Vec<&Descriptor>, Vec<&Descriptor>) = graph
            .iter()
            .partition(|d| d.is_index() || d.is_manifest());
        debug!(image = %image, blobs = blobs.len(), manifests = manifests.len(), "pushing graph");

        stream::iter(
            blobs
                .into_iter()
                .map(|blob| self.push_blob(&session, blob, tracker.clone()))
                .collect::<Vec<_>>(),
        )
        .buffer_unordered(MAX_CONCURRENT_TRANSFERS)
        .try_collect::<Vec<()>>()
        .await?;

        // Children before parents so the registry can resolve every reference.
        for descriptor in manifests.into_iter().rev() {
            let reference = if descriptor.digest == root.digest {
                image.reference()
            } else {
                descriptor.digest.to_string()
            };
            self.push_manifest(&session, descriptor, &reference, &tracker)
                .await?;
        }

        info!(image = %image, digest = %root.digest, "pushed image");
        Ok(())
    }

    async fn push_blob(
        &self,
        session: &Session<'_>,
        blob: &Descriptor,
        tracker: Arc<PushTracker>,
    ) -> Result<(), TransferError> {
        let url = session.url(&format!("blobs/{}", blob.digest));
        let head = session.send(|| session.http().head(&url)).await?;
        if head.status() == StatusCode::OK {
            debug!(digest = %blob.digest, "blob already in registry");
            tracker.exists(blob);
            return Ok(());
        }

        tracker.start(blob);
        let result = self.upload_blob(session, blob, tracker.clone()).await;
        match &result {
            Ok(()) => tracker.commit(blob),
            Err(_) => tracker.abort(&blob.digest),
        }
        result
    }

    async fn upload_blob(
        &self,
        session: &Session<'_>,
        blob: &Descriptor,
        tracker: Arc<PushTracker>,
    ) -> Result<(), TransferError> {
        let data = self.store.read_blob(&blob.digest).await?;

        let start_url = session.url("blobs/uploads/");
        let started = check(session.send(|| session.http().post(&start_url)).await?).await?;
        let location = started
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| TransferError::Registry {
                status: started.status().as_u16(),
                message: "upload session without Location header".to_string(),
            })?;
        let mut put_url = session.absolute(location);
        put_url.push(if put_url.contains('?') { '&' } else { '?' });
        put_url.push_str(&format!("digest={}", urlencoding::encode(blob.digest.as_str())));

        let response = session
            .send(|| {
                session
                    .http()
                    .put(&put_url)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .header(CONTENT_LENGTH, data.len())
                    .body(upload_body(data.clone(), blob.digest.clone(), tracker.clone()))
            })
            .await?;
        check(response).await?;
        debug!(digest = %blob.digest, size = blob.size, "uploaded blob");
        Ok(())
    }

    async fn push_manifest(
        &self,
        session: &Session<'_>,
        descriptor: &Descriptor,
        reference: &str,
        tracker: &PushTracker,
    ) -> Result<(), TransferError> {
        let data = self.store.read_blob(&descriptor.digest).await?;
        let url = session.url(&format!("manifests/{reference}"));

        tracker.start(descriptor);
        let response = session
            .send(|| {
                session
                    .http()
                    .put(&url)
                    .header(CONTENT_TYPE, &descriptor.media_type)
                    .body(data.clone())
            })
            .await;
        match response {
            Ok(response) => match check(response).await {
                Ok(_) => {
                    tracker.commit(descriptor);
                    debug!(digest = %descriptor.digest, %reference, "pushed manifest");
                    Ok(())
                }
                Err(err) => {
                    tracker.abort(&descriptor.digest);
                    Err(err)
                }
            },
            Err(err) => {
                tracker.abort(&descriptor.digest);
                Err(err)
            }
        }
    }
}

/// A request body that reports bytes handed to the connection.
fn upload_body(data: Bytes, digest: Digest, tracker: Arc<PushTracker>) -> reqwest::Body {
    reqwest::Body::wrap_stream(upload_chunks(data, digest, tracker))
}

fn upload_chunks(
    data: Bytes,
    digest: Digest,
    tracker: Arc<PushTracker>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(UPLOAD_CHUNK)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK).min(data.len())))
        .collect();
    let mut sent = 0u64;
    stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        tracker.progress(&digest, sent);
        Ok(chunk)
    })
}

fn inspect_error(err: InspectError) -> TransferError {
    match err {
        InspectError::Content(err) => TransferError::Content(err),
        InspectError::Manifest(err) => TransferError::Manifest(err),
        other => TransferError::Other(other.to_string()),
    }
}
