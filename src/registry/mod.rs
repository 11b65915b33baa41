// ABOUTME: OCI distribution client implementing the transfer primitive.
// ABOUTME: Pulls into and pushes from a local content store.

mod auth;
mod client;
mod pull;
mod push;

pub use auth::{Challenge, Credential};
pub use client::{MAX_CONCURRENT_TRANSFERS, RegistryClient, RegistryOptions};

use crate::progress::PushTracker;
use crate::runtime::traits::{
    DiscoveryHandler, ImageRecord, ResolverOptions, Transfer, TransferError,
};
use crate::types::{Descriptor, ImageRef};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
impl Transfer for RegistryClient {
    async fn pull(
        &self,
        reference: &ImageRef,
        handler: DiscoveryHandler<'_>,
        options: &ResolverOptions,
    ) -> Result<ImageRecord, TransferError> {
        self.pull_image(reference, handler, options).await
    }

    async fn push(
        &self,
        reference: &ImageRef,
        descriptor: &Descriptor,
        handler: DiscoveryHandler<'_>,
        options: &ResolverOptions,
        tracker: Arc<PushTracker>,
    ) -> Result<(), TransferError> {
        self.push_image(reference, descriptor, handler, options, tracker)
            .await
    }
}
