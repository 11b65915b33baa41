// ABOUTME: Container image reference parsing and normalization.
// ABOUTME: Handles formats like nginx, nginx:tag, registry:5000/image:tag@digest.

use super::Digest;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_REGISTRY: &str = "docker.io";
pub const DEFAULT_TAG: &str = "latest";

/// Host actually serving the Docker Hub API.
const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

#[derive(Debug, Error)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),

    #[error("repository name must be lowercase: {0}")]
    Uppercase(String),

    #[error("invalid digest in image reference: {0}")]
    InvalidDigest(#[from] super::digest::ParseDigestError),
}

/// A normalized image reference.
///
/// Bare names resolve against Docker Hub (`nginx` becomes
/// `docker.io/library/nginx:latest`), and a reference with neither tag nor
/// digest gets the `latest` tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<Digest>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }
        if input.contains("://") {
            return Err(ParseImageRefError::InvalidFormat(input.to_string()));
        }

        if let Some(bad) = input
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !"/:.-_@".contains(*c))
        {
            return Err(ParseImageRefError::InvalidChar(bad));
        }

        let (without_digest, digest) = match input.split_once('@') {
            Some((before, after)) => (before, Some(Digest::parse(after)?)),
            None => (input, None),
        };

        // A colon after the last slash separates the tag; earlier colons
        // belong to a registry port.
        let last_slash = without_digest.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (without_tag, tag) = match without_digest[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                let tag = &without_digest[split + 1..];
                if tag.is_empty() || tag.len() > 128 {
                    return Err(ParseImageRefError::InvalidFormat(input.to_string()));
                }
                (&without_digest[..split], Some(tag.to_string()))
            }
            None => (without_digest, None),
        };

        let (registry, repository) = Self::split_registry(without_tag, input)?;

        let tag = match (&tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            _ => tag,
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    fn split_registry(input: &str, original: &str) -> Result<(String, String), ParseImageRefError> {
        let (registry, repository) = match input.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (DEFAULT_REGISTRY.to_string(), input.to_string()),
        };

        if repository.is_empty()
            || repository
                .split('/')
                .any(|component| component.is_empty() || component.contains(':'))
        {
            return Err(ParseImageRefError::InvalidFormat(original.to_string()));
        }
        if repository.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(ParseImageRefError::Uppercase(repository));
        }

        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        Ok((registry, repository))
    }

    /// Registry host as written in the reference (`docker.io` by default).
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Host to send distribution API requests to.
    pub fn api_host(&self) -> &str {
        if self.registry == DEFAULT_REGISTRY {
            DOCKER_HUB_API_HOST
        } else {
            &self.registry
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// `registry/repository` without tag or digest.
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// What to ask the registry for: the digest when pinned, else the tag.
    pub fn reference(&self) -> String {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => digest.to_string(),
            (None, Some(tag)) => tag.clone(),
            (None, None) => DEFAULT_TAG.to_string(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ImageRef {
    type Err = ParseImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}
