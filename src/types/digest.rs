// ABOUTME: Content digest parsing and computation.
// ABOUTME: Validates "algorithm:hex" strings and computes sha256 digests of blobs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use thiserror::Error;

/// The only algorithm computed locally.
pub const SHA256: &str = "sha256";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseDigestError {
    #[error("digest is missing an algorithm prefix: {0}")]
    MissingAlgorithm(String),

    #[error("invalid digest algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("invalid digest encoding: {0}")]
    InvalidHex(String),

    #[error("{algorithm} digest must be {expected} hex characters, got {actual}")]
    InvalidLength {
        algorithm: String,
        expected: usize,
        actual: usize,
    },
}

/// A validated content digest such as `sha256:9f86d0...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    pub fn parse(input: &str) -> Result<Self, ParseDigestError> {
        let (algorithm, hex) = input
            .split_once(':')
            .ok_or_else(|| ParseDigestError::MissingAlgorithm(input.to_string()))?;

        if algorithm.is_empty()
            || !algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
        {
            return Err(ParseDigestError::InvalidAlgorithm(algorithm.to_string()));
        }

        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
            return Err(ParseDigestError::InvalidHex(input.to_string()));
        }

        if algorithm == SHA256 && hex.len() != 64 {
            return Err(ParseDigestError::InvalidLength {
                algorithm: algorithm.to_string(),
                expected: 64,
                actual: hex.len(),
            });
        }

        Ok(Self(input.to_string()))
    }

    /// Compute the sha256 digest of `data`.
    pub fn sha256(data: &[u8]) -> Self {
        Self::from_hasher(Sha256::new_with_prefix(data))
    }

    /// Finish an incremental sha256 computation.
    pub fn from_hasher(hasher: Sha256) -> Self {
        Self(format!("{}:{:x}", SHA256, hasher.finalize()))
    }

    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(a, _)| a).unwrap_or_default()
    }

    pub fn hex(&self) -> &str {
        self.0.split_once(':').map(|(_, h)| h).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex characters, as shown in progress output.
    pub fn short(&self) -> &str {
        let hex = self.hex();
        &hex[..hex.len().min(12)]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Digest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}
