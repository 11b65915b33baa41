// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles platform strings and registry host names.

use serde::Deserialize;

use crate::types::Platform;

pub fn deserialize_platform<'de, D>(deserializer: D) -> Result<Option<Platform>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    s.map(|s| Platform::parse(&s))
        .transpose()
        .map_err(serde::de::Error::custom)
}

/// Registry hosts are compared case-insensitively and without a scheme.
pub fn deserialize_host<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let host = s
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_ascii_lowercase();
    if host.is_empty() || host.contains('/') {
        return Err(serde::de::Error::custom(format!("invalid registry host: {s}")));
    }
    Ok(host)
}
