// ABOUTME: Registry transfer primitive trait.
// ABOUTME: Pull and push whole images, reporting each discovered descriptor to a handler.

use super::content::ContentError;
use super::images::ImageStoreError;
use super::shared_types::{ImageRecord, ResolverOptions};
use crate::progress::PushTracker;
use crate::types::{Descriptor, ImageRef, ManifestError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Called once for every content unit met while walking an image graph.
pub type DiscoveryHandler<'a> = &'a (dyn Fn(&Descriptor) + Send + Sync);

/// Moves images between a registry and the local store.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Fetch an image and all its content, then record it in the image store.
    async fn pull(
        &self,
        reference: &ImageRef,
        handler: DiscoveryHandler<'_>,
        options: &ResolverOptions,
    ) -> Result<ImageRecord, TransferError>;

    /// Upload the graph rooted at `descriptor` under `reference`.
    ///
    /// Upload progress is published through `tracker`.
    async fn push(
        &self,
        reference: &ImageRef,
        descriptor: &Descriptor,
        handler: DiscoveryHandler<'_>,
        options: &ResolverOptions,
        tracker: Arc<PushTracker>,
    ) -> Result<(), TransferError>;
}

/// Errors from the transfer primitive.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to resolve {reference}: {message}")]
    Resolve { reference: String, message: String },

    #[error("authentication failed for registry: {0}")]
    Unauthorized(String),

    #[error("registry returned {status}: {message}")]
    Registry { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("no manifest for platform {0}")]
    NoMatchingPlatform(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Images(#[from] ImageStoreError),

    #[error("transfer timed out after {0:?}")]
    Timeout(Duration),

    #[error("transfer error: {0}")]
    Other(String),
}

impl TransferError {
    /// Failures worth retrying: network trouble, timeouts, and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::Network(_) | TransferError::Timeout(_) => true,
            TransferError::Registry { status, .. } => *status == 429 || *status >= 500,
            TransferError::Content(ContentError::Io(_)) => true,
            _ => false,
        }
    }
}
