// ABOUTME: Reads image graphs out of a content store.
// ABOUTME: Child listing, platform manifest selection, config extraction, full walks.

use crate::runtime::traits::{ContentError, ContentStore};
use crate::types::manifest::{self, ImageSpec, Manifest};
use crate::types::{Descriptor, ImageConfig, ManifestError, Platform, media_types};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("no manifest for platform {0}")]
    NoMatchingManifest(Platform),

    #[error("unknown media type {0:?}")]
    UnknownMediaType(String),

    #[error("malformed image config: {0}")]
    Config(#[from] serde_json::Error),
}

impl InspectError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, InspectError::Content(err) if err.is_not_found())
    }
}

/// Direct children of `descriptor`, reading the blob only for indexes and manifests.
pub async fn children<C>(store: &C, descriptor: &Descriptor) -> Result<Vec<Descriptor>, InspectError>
where
    C: ContentStore + ?Sized,
{
    if !descriptor.is_index() && !descriptor.is_manifest() {
        return Ok(Vec::new());
    }
    let data = store.read_blob(&descriptor.digest).await?;
    Ok(manifest::children(descriptor, &data)?)
}

/// The manifest to use for `platform`.
///
/// Non-index targets are returned as-is. For an index, the first child whose
/// platform matches is returned, or `None` when nothing matches.
pub async fn select_platform_manifest<C>(
    store: &C,
    target: &Descriptor,
    platform: &Platform,
) -> Result<Option<Descriptor>, InspectError>
where
    C: ContentStore + ?Sized,
{
    if !target.is_index() {
        return Ok(Some(target.clone()));
    }
    let selected = children(store, target).await?.into_iter().find(|child| {
        child
            .platform
            .as_ref()
            .is_some_and(|candidate| platform.matches(candidate))
    });
    Ok(selected)
}

/// Runtime configuration of the image rooted at `target`.
pub async fn image_config<C>(
    store: &C,
    target: &Descriptor,
    platform: &Platform,
) -> Result<ImageConfig, InspectError>
where
    C: ContentStore + ?Sized,
{
    let manifest_desc = select_platform_manifest(store, target, platform)
        .await?
        .ok_or_else(|| InspectError::NoMatchingManifest(platform.clone()))?;
    if !manifest_desc.is_manifest() {
        return Err(InspectError::UnknownMediaType(manifest_desc.media_type));
    }

    let data = store.read_blob(&manifest_desc.digest).await?;
    let manifest = Manifest::parse(&data, &manifest_desc.media_type)?;
    let config = manifest.config;
    if !media_types::is_config(&config.media_type) {
        return Err(InspectError::UnknownMediaType(config.media_type));
    }

    let blob = store.read_blob(&config.digest).await?;
    let spec: ImageSpec = serde_json::from_slice(&blob)?;
    Ok(spec.config.unwrap_or_default())
}

/// Every descriptor reachable from `root` that is present locally, root first.
///
/// Index children for other platforms are usually absent after a pull and
/// are skipped; a missing manifest child is an error.
pub async fn walk<C>(store: &C, root: &Descriptor) -> Result<Vec<Descriptor>, InspectError>
where
    C: ContentStore + ?Sized,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut queue = VecDeque::from([root.clone()]);

    while let Some(descriptor) = queue.pop_front() {
        if !seen.insert(descriptor.digest.clone()) {
            continue;
        }
        let kids = children(store, &descriptor).await?;
        let from_index = descriptor.is_index();
        out.push(descriptor);
        for child in kids {
            if from_index && !store.contains(&child.digest).await? {
                debug!(digest = %child.digest, "skipping index child not present locally");
                continue;
            }
            queue.push_back(child);
        }
    }

    Ok(out)
}
