// ABOUTME: Registry authentication: WWW-Authenticate challenges and bearer tokens.
// ABOUTME: Supports anonymous, basic, and token-server flows.

use crate::runtime::traits::{RegistryAuth, TransferError};
use reqwest::RequestBuilder;
use tracing::debug;

/// Parsed `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

impl Challenge {
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
        if scheme.eq_ignore_ascii_case("basic") {
            Some(Challenge::Basic)
        } else if scheme.eq_ignore_ascii_case("bearer") {
            Some(Challenge::Bearer {
                realm: extract_param(params, "realm")?,
                service: extract_param(params, "service"),
                scope: extract_param(params, "scope"),
            })
        } else {
            None
        }
    }
}

/// What to attach to requests once a challenge has been answered.
#[derive(Debug, Clone)]
pub enum Credential {
    Basic { username: String, password: String },
    Bearer(String),
}

impl Credential {
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credential::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credential::Bearer(token) => request.bearer_auth(token),
        }
    }
}

/// Answer `challenge` for `scope`, fetching a token when the registry uses
/// a token server.
pub async fn answer(
    http: &reqwest::Client,
    host: &str,
    challenge: &Challenge,
    scope: &str,
    auth: Option<&RegistryAuth>,
) -> Result<Credential, TransferError> {
    match challenge {
        Challenge::Basic => auth
            .map(|a| Credential::Basic {
                username: a.username.clone(),
                password: a.password.clone(),
            })
            .ok_or_else(|| TransferError::Unauthorized(host.to_string())),
        Challenge::Bearer {
            realm,
            service,
            scope: challenge_scope,
        } => {
            let scope = challenge_scope.as_deref().unwrap_or(scope);
            let mut url = format!("{}?scope={}", realm, urlencoding::encode(scope));
            if let Some(service) = service {
                url.push_str(&format!("&service={}", urlencoding::encode(service)));
            }
            debug!(%host, %scope, "fetching registry token");

            let mut request = http.get(&url);
            if let Some(auth) = auth {
                request = request.basic_auth(&auth.username, Some(&auth.password));
            }
            let response = request.send().await.map_err(network_error)?;
            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return Err(TransferError::Unauthorized(host.to_string()));
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(TransferError::Registry {
                    status: status.as_u16(),
                    message: format!("token endpoint: {}", message.trim()),
                });
            }

            let body: serde_json::Value = response.json().await.map_err(network_error)?;
            let token = body
                .get("token")
                .or_else(|| body.get("access_token"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| TransferError::Other("token response missing token field".to_string()))?;
            Ok(Credential::Bearer(token.to_string()))
        }
    }
}

pub(super) fn network_error(err: reqwest::Error) -> TransferError {
    TransferError::Network(err.to_string())
}

/// Extract a parameter value from a `WWW-Authenticate` header, e.g. the
/// value of `realm="..."`.
fn extract_param(header: &str, param: &str) -> Option<String> {
    let search = format!("{}=\"", param);
    let start = header.find(&search)? + search.len();
    let end = header[start..].find('"')?;
    Some(header[start..start + end].to_string())
}
