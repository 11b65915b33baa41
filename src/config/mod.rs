// ABOUTME: Configuration types and parsing for imgferry.yml.
// ABOUTME: Handles YAML parsing, registry credentials, and transfer tuning.

mod deserialize;
mod env_value;
mod init;

pub use env_value::EnvValue;
pub use init::init_config;

use crate::error::{Error, Result};
use crate::registry::RegistryOptions;
use crate::runtime::traits::RegistryAuth;
use crate::transfer::{
    DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT, RetryPolicy, TransferSettings,
};
use crate::progress::DEFAULT_TICK_INTERVAL;
use crate::types::{DEFAULT_REGISTRY, Platform};
use deserialize::{deserialize_host, deserialize_platform};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "imgferry.yml";
pub const CONFIG_FILENAME_ALT: &str = "imgferry.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".imgferry/config.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Local store directory.
    #[serde(default)]
    pub store: Option<PathBuf>,

    #[serde(default, deserialize_with = "deserialize_platform")]
    pub platform: Option<Platform>,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub registries: Vec<RegistryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Push attempts, including the first.
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_backoff", with = "humantime_serde")]
    pub backoff: Duration,

    /// Progress refresh interval.
    #[serde(default = "default_tick", with = "humantime_serde")]
    pub tick: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default)]
    pub plain_http: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            backoff: default_backoff(),
            tick: default_tick(),
            timeout: default_timeout(),
            plain_http: false,
        }
    }
}

fn default_retries() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff() -> Duration {
    DEFAULT_BACKOFF
}

fn default_tick() -> Duration {
    DEFAULT_TICK_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(deserialize_with = "deserialize_host")]
    pub host: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<EnvValue>,

    /// Reach this registry over plain HTTP.
    #[serde(default)]
    pub insecure: bool,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Like [`Config::discover`], but a missing file yields the defaults.
    pub fn discover_or_default(dir: &Path) -> Result<Self> {
        match Self::discover(dir) {
            Err(Error::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.transfer.retries == 0 {
            return Err(Error::InvalidConfig(
                "transfer.retries must be at least 1".to_string(),
            ));
        }
        if self.transfer.tick.is_zero() {
            return Err(Error::InvalidConfig(
                "transfer.tick must be greater than zero".to_string(),
            ));
        }
        for (i, registry) in self.registries.iter().enumerate() {
            if registry.password.is_some() && registry.username.is_none() {
                return Err(Error::InvalidConfig(format!(
                    "registries[{i}] ({}) has a password but no username",
                    registry.host
                )));
            }
        }
        Ok(())
    }

    /// The configured store directory, or the per-user default.
    pub fn store_dir(&self) -> PathBuf {
        self.store.clone().unwrap_or_else(default_store_dir)
    }

    pub fn settings(&self) -> TransferSettings {
        TransferSettings {
            retry: RetryPolicy {
                max_attempts: self.transfer.retries,
                backoff: self.transfer.backoff,
            },
            tick_interval: self.transfer.tick,
            timeout: self.transfer.timeout,
            platform: self.platform.clone().unwrap_or_else(Platform::host),
            plain_http: self.transfer.plain_http,
        }
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            insecure_hosts: self
                .registries
                .iter()
                .filter(|r| r.insecure)
                .map(|r| r.host.clone())
                .collect(),
        }
    }

    /// Credentials configured for `registry`, with secrets resolved.
    pub fn auth_for(&self, registry: &str) -> Result<Option<RegistryAuth>> {
        let registry = registry.to_ascii_lowercase();
        let Some(entry) = self.registries.iter().find(|r| {
            r.host == registry || (registry == DEFAULT_REGISTRY && r.host == "index.docker.io")
        }) else {
            return Ok(None);
        };
        let Some(username) = &entry.username else {
            return Ok(None);
        };
        let password = match &entry.password {
            Some(value) => value.resolve()?,
            None => String::new(),
        };
        Ok(Some(RegistryAuth {
            username: username.clone(),
            password,
            server: Some(entry.host.clone()),
        }))
    }
}

fn default_store_dir() -> PathBuf {
    if let Ok(data) = std::env::var("XDG_DATA_HOME")
        && !data.is_empty()
    {
        return PathBuf::from(data).join("imgferry");
    }
    match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => PathBuf::from(home).join(".local/share/imgferry"),
        _ => PathBuf::from(".imgferry/store"),
    }
}
