// ABOUTME: Image manifest, index, and config document types.
// ABOUTME: Parses the JSON documents that link descriptors into an image graph.

use super::descriptor::{Descriptor, media_types};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("malformed {media_type} document: {source}")]
    Malformed {
        media_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

/// An image manifest (OCI or Docker schema 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// An image index or Docker manifest list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Manifest {
    pub fn parse(data: &[u8], media_type: &str) -> Result<Self, ManifestError> {
        serde_json::from_slice(data).map_err(|source| ManifestError::Malformed {
            media_type: media_type.to_string(),
            source,
        })
    }
}

impl Index {
    pub fn parse(data: &[u8], media_type: &str) -> Result<Self, ManifestError> {
        serde_json::from_slice(data).map_err(|source| ManifestError::Malformed {
            media_type: media_type.to_string(),
            source,
        })
    }
}

/// Determine a manifest document's media type when the registry did not
/// send a usable Content-Type.
pub fn sniff_media_type(data: &[u8]) -> Option<String> {
    let raw: serde_json::Value = serde_json::from_slice(data).ok()?;
    if let Some(media_type) = raw.get("mediaType").and_then(|v| v.as_str()) {
        return Some(media_type.to_string());
    }
    if raw.get("manifests").is_some() {
        Some(media_types::OCI_INDEX.to_string())
    } else if raw.get("config").is_some() {
        Some(media_types::OCI_MANIFEST.to_string())
    } else if raw.get("fsLayers").is_some() {
        Some(media_types::DOCKER_SCHEMA1_MANIFEST.to_string())
    } else {
        None
    }
}

/// Direct children of a blob in the image graph.
///
/// Indexes yield their manifests, manifests yield config then layers, and
/// every other blob is a leaf.
pub fn children(descriptor: &Descriptor, data: &[u8]) -> Result<Vec<Descriptor>, ManifestError> {
    if media_types::is_index(&descriptor.media_type) {
        Ok(Index::parse(data, &descriptor.media_type)?.manifests)
    } else if media_types::is_manifest(&descriptor.media_type) {
        let manifest = Manifest::parse(data, &descriptor.media_type)?;
        let mut out = Vec::with_capacity(manifest.layers.len() + 1);
        out.push(manifest.config);
        out.extend(manifest.layers);
        Ok(out)
    } else if descriptor.is_schema1() {
        Err(ManifestError::UnsupportedMediaType(
            descriptor.media_type.clone(),
        ))
    } else {
        Ok(Vec::new())
    }
}

/// The image config blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageSpec {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ImageConfig>,
}

/// Runtime configuration carried by an image, returned from a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exposed_ports: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
}
