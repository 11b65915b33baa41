// ABOUTME: Validated domain types for image content.
// ABOUTME: References, digests, descriptors, and manifest documents.

mod descriptor;
pub(crate) mod digest;
mod image_ref;
pub mod manifest;

pub use descriptor::{ContentKind, Descriptor, Platform, media_types};
pub use digest::{Digest, ParseDigestError};
pub use image_ref::{DEFAULT_REGISTRY, DEFAULT_TAG, ImageRef, ParseImageRefError};
pub use manifest::{ImageConfig, ImageSpec, Index, Manifest, ManifestError};
