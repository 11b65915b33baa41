// ABOUTME: OCI distribution HTTP client bound to a local store.
// ABOUTME: Handles URL building, plain-HTTP registries, and the 401 challenge retry.

use super::auth::{self, Challenge, Credential, network_error};
use crate::local::LocalStore;
use crate::runtime::traits::{RegistryAuth, ResolverOptions, TransferError};
use crate::types::ImageRef;
use parking_lot::Mutex;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Blobs fetched or sent at the same time.
pub const MAX_CONCURRENT_TRANSFERS: usize = 3;

/// Client-wide registry settings.
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Hosts reached over plain HTTP.
    pub insecure_hosts: Vec<String>,
}

/// Talks to registries on behalf of one local store.
pub struct RegistryClient {
    pub(super) http: reqwest::Client,
    pub(super) store: Arc<LocalStore>,
    options: RegistryOptions,
    credentials: Mutex<HashMap<String, Credential>>,
}

impl RegistryClient {
    pub fn new(store: Arc<LocalStore>, options: RegistryOptions) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("imgferry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransferError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            store,
            options,
            credentials: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// `http` for loopback, configured insecure hosts, or when asked; `https` otherwise.
    pub fn scheme(&self, host: &str, plain_http: bool) -> &'static str {
        let bare = host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host);
        if plain_http
            || bare == "localhost"
            || bare == "127.0.0.1"
            || host.starts_with("[::1]")
            || self.options.insecure_hosts.iter().any(|h| h == host || h == bare)
        {
            "http"
        } else {
            "https"
        }
    }

    pub(super) fn session<'a>(
        &'a self,
        image: &'a ImageRef,
        options: &'a ResolverOptions,
        actions: &str,
    ) -> Session<'a> {
        let host = image.api_host();
        Session {
            client: self,
            image,
            auth: options.auth.as_ref(),
            origin: format!("{}://{}", self.scheme(host, options.plain_http), host),
            scope: format!("repository:{}:{}", image.repository(), actions),
        }
    }
}

/// Requests against one repository with one set of credentials.
pub(super) struct Session<'a> {
    client: &'a RegistryClient,
    pub image: &'a ImageRef,
    auth: Option<&'a RegistryAuth>,
    origin: String,
    scope: String,
}

impl Session<'_> {
    pub fn http(&self) -> &reqwest::Client {
        &self.client.http
    }

    /// `https://host/v2/<repository>/<path>`
    pub fn url(&self, path: &str) -> String {
        format!("{}/v2/{}/{}", self.origin, self.image.repository(), path)
    }

    /// Resolve a `Location` header against the registry origin.
    pub fn absolute(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}{}", self.origin, location)
        }
    }

    fn credential_key(&self) -> String {
        format!("{} {}", self.origin, self.scope)
    }

    /// Send a request, answering one authentication challenge if needed.
    ///
    /// `build` may be called twice, so it must produce a fresh request each time.
    pub async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, TransferError> {
        let key = self.credential_key();
        let cached = self.client.credentials.lock().get(&key).cloned();
        let request = match &cached {
            Some(credential) => credential.apply(build()),
            None => build(),
        };
        let response = request.send().await.map_err(network_error)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let host = self.image.api_host();
        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(Challenge::parse)
            .ok_or_else(|| TransferError::Unauthorized(host.to_string()))?;
        debug!(%host, scope = %self.scope, ?challenge, "answering registry challenge");

        let credential = auth::answer(self.http(), host, &challenge, &self.scope, self.auth).await?;
        let response = credential.apply(build()).send().await.map_err(network_error)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(TransferError::Unauthorized(host.to_string()));
        }
        self.client.credentials.lock().insert(key, credential);
        Ok(response)
    }
}

/// Turn a non-success response into an error, keeping the body for context.
pub(super) async fn check(response: Response) -> Result<Response, TransferError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::FORBIDDEN {
        return Err(TransferError::Unauthorized(
            response.url().host_str().unwrap_or_default().to_string(),
        ));
    }
    let message = response.text().await.unwrap_or_default();
    Err(TransferError::Registry {
        status: status.as_u16(),
        message: message.trim().chars().take(512).collect(),
    })
}
