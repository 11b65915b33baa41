// ABOUTME: Content descriptors, media types, and platform matching.
// ABOUTME: A descriptor names one content-addressable blob by digest, media type, and size.

use super::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod media_types {
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
    pub const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";
    pub const OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
    pub const OCI_LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
    pub const DOCKER_LAYER_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
    pub const DOCKER_FOREIGN_LAYER: &str =
        "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";
    pub const DOCKER_SCHEMA1_MANIFEST: &str =
        "application/vnd.docker.distribution.manifest.v1+prettyjws";

    pub fn is_index(media_type: &str) -> bool {
        media_type == OCI_INDEX || media_type == DOCKER_MANIFEST_LIST
    }

    pub fn is_manifest(media_type: &str) -> bool {
        media_type == OCI_MANIFEST || media_type == DOCKER_MANIFEST
    }

    pub fn is_config(media_type: &str) -> bool {
        media_type == OCI_CONFIG || media_type == DOCKER_CONFIG
    }

    pub fn is_layer(media_type: &str) -> bool {
        media_type.starts_with(OCI_LAYER)
            || media_type.starts_with("application/vnd.oci.image.layer.nondistributable.")
            || media_type == DOCKER_LAYER_GZIP
            || media_type == DOCKER_FOREIGN_LAYER
    }
}

/// What a descriptor points at, derived from its media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Index,
    Manifest,
    Config,
    Layer,
    Unknown,
}

impl ContentKind {
    pub fn of(media_type: &str) -> Self {
        if media_types::is_index(media_type) {
            ContentKind::Index
        } else if media_types::is_manifest(media_type)
            || media_type == media_types::DOCKER_SCHEMA1_MANIFEST
        {
            ContentKind::Manifest
        } else if media_types::is_config(media_type) {
            ContentKind::Config
        } else if media_types::is_layer(media_type) {
            ContentKind::Layer
        } else {
            ContentKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Index => "index",
            ContentKind::Manifest => "manifest",
            ContentKind::Config => "config",
            ContentKind::Layer => "layer",
            ContentKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content descriptor as found in manifests and indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            platform: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Build a descriptor for `data`, computing its sha256 digest.
    pub fn for_blob(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self::new(media_type, Digest::sha256(data), data.len() as u64)
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn kind(&self) -> ContentKind {
        ContentKind::of(&self.media_type)
    }

    /// Stable key used for progress rows and in-flight transfer entries.
    pub fn ref_key(&self) -> String {
        format!("{}-{}", self.kind(), self.digest)
    }

    pub fn is_index(&self) -> bool {
        self.kind() == ContentKind::Index
    }

    pub fn is_manifest(&self) -> bool {
        media_types::is_manifest(&self.media_type)
    }

    /// Legacy schema 1 manifests are never tracked for progress.
    pub fn is_schema1(&self) -> bool {
        self.media_type == media_types::DOCKER_SCHEMA1_MANIFEST
    }
}

/// Target platform of an image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            architecture: architecture.into(),
            os: os.into(),
            os_version: None,
            variant: None,
        }
    }

    /// The platform of the running host.
    pub fn host() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        Self::new(os, host_arch())
    }

    /// Parse `os/arch[/variant]`.
    pub fn parse(input: &str) -> Result<Self, String> {
        let parts: Vec<&str> = input.trim().split('/').collect();
        match parts.as_slice() {
            [os, arch] if !os.is_empty() && !arch.is_empty() => Ok(Self::new(*os, *arch)),
            [os, arch, variant] if !os.is_empty() && !arch.is_empty() && !variant.is_empty() => {
                let mut platform = Self::new(*os, *arch);
                platform.variant = Some((*variant).to_string());
                Ok(platform)
            }
            _ => Err(format!("invalid platform (expected os/arch[/variant]): {input}")),
        }
    }

    /// Whether a manifest built for `other` can run on this platform.
    ///
    /// A missing variant on `self` accepts any variant; arm64 treats a missing
    /// variant as `v8`.
    pub fn matches(&self, other: &Platform) -> bool {
        if self.os != other.os || self.architecture != other.architecture {
            return false;
        }
        match &self.variant {
            None => true,
            Some(wanted) => {
                let actual = other
                    .variant
                    .as_deref()
                    .or(if other.architecture == "arm64" { Some("v8") } else { None });
                actual == Some(wanted.as_str())
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(ref variant) = self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

/// Map Rust `std::env::consts::ARCH` values to OCI platform names.
fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    }
}
