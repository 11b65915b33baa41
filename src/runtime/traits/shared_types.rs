// ABOUTME: Shared types used across collaborator trait definitions.
// ABOUTME: RegistryAuth, ResolverOptions, ActiveStatus, ContentInfo, ImageRecord.

use crate::types::{Descriptor, Digest, ImageRef, Platform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry authentication credentials.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
    /// Registry server (e.g., "ghcr.io").
    pub server: Option<String>,
}

/// Options handed to the transfer primitive for one pull or push.
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Credentials, anonymous when absent.
    pub auth: Option<RegistryAuth>,
    /// Talk plain HTTP to the registry.
    pub plain_http: bool,
    /// Platform to select from multi-platform indexes.
    pub platform: Option<Platform>,
}

/// An in-flight transfer as reported by a status source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStatus {
    /// Ref key of the content being transferred.
    pub key: String,
    /// Bytes transferred so far.
    pub offset: u64,
    /// Expected total bytes, zero when unknown.
    pub total: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata of committed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInfo {
    pub digest: Digest,
    pub size: u64,
    /// When the content was committed.
    pub created_at: DateTime<Utc>,
}

/// A named image in the local image store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub name: ImageRef,
    pub target: Descriptor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn new(name: ImageRef, target: Descriptor) -> Self {
        let now = Utc::now();
        Self {
            name,
            target,
            created_at: now,
            updated_at: now,
        }
    }
}
