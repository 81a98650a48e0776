//! OpenID Connect discovery
//!
//! Resolves the authorization server's `authorization_endpoint` and
//! `token_endpoint` from its discovery document at
//! `<base>/.well-known/openid-configuration` (OpenID Connect Discovery 1.0,
//! section 4).
//!
//! [`MetadataResolver`] caches the first successful resolution for the
//! lifetime of the resolver. Concurrent callers share one in-flight request;
//! a failed resolution leaves the cache empty so the next caller retries.
//!
//! # References
//!
//! - OpenID Connect Discovery 1.0 <https://openid.net/specs/openid-connect-discovery-1_0.html>

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use url::Url;

use crate::error::{NativeOidcError, Result};

// ---------------------------------------------------------------------------
// ServerMetadata
// ---------------------------------------------------------------------------

/// The subset of the discovery document the authorization code flow needs.
///
/// # Examples
///
/// ```
/// use native_oidc::oidc::discovery::ServerMetadata;
///
/// let meta = ServerMetadata {
///     authorization_endpoint: "https://idp.example.com/authorize".to_string(),
///     token_endpoint: "https://idp.example.com/token".to_string(),
///     code_challenge_methods_supported: None,
/// };
/// assert!(!meta.advertises_s256());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetadata {
    /// The URL of the authorization endpoint, exactly as published.
    pub authorization_endpoint: String,

    /// The URL of the token endpoint, exactly as published.
    pub token_endpoint: String,

    /// PKCE challenge methods the server advertises, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,
}

impl ServerMetadata {
    /// Returns `true` when the server lists `S256` among its PKCE methods.
    pub fn advertises_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .any(|m| m == "S256")
    }
}

/// Raw discovery document. Every field is optional so that a missing
/// endpoint is reported as a discovery error naming the field rather than a
/// generic JSON error.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(default)]
    authorization_endpoint: Option<String>,
    #[serde(default)]
    token_endpoint: Option<String>,
    #[serde(default)]
    code_challenge_methods_supported: Option<Vec<String>>,
    #[serde(flatten)]
    _extra: HashMap<String, serde_json::Value>,
}

impl DiscoveryDocument {
    fn into_metadata(self) -> Result<ServerMetadata> {
        let authorization_endpoint =
            required_endpoint("authorization_endpoint", self.authorization_endpoint)?;
        let token_endpoint = required_endpoint("token_endpoint", self.token_endpoint)?;

        Ok(ServerMetadata {
            authorization_endpoint,
            token_endpoint,
            code_challenge_methods_supported: self.code_challenge_methods_supported,
        })
    }
}

fn required_endpoint(field: &str, value: Option<String>) -> Result<String> {
    let value = value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| NativeOidcError::Discovery(format!("discovery document missing {field}")))?;

    Url::parse(&value).map_err(|e| {
        NativeOidcError::Discovery(format!("{field} is not a valid URL: {value}: {e}"))
    })?;

    Ok(value)
}

// ---------------------------------------------------------------------------
// Discovery helpers
// ---------------------------------------------------------------------------

/// Builds the discovery URL by appending the path segments `.well-known` and
/// `openid-configuration` to `base_url`.
///
/// A trailing slash on the base URL does not produce an empty segment, and
/// any query or fragment is dropped.
///
/// # Errors
///
/// Returns [`NativeOidcError::Discovery`] when `base_url` cannot carry a path
/// (for example `mailto:` URLs).
///
/// # Examples
///
/// ```
/// use native_oidc::oidc::discovery::discovery_url;
/// use url::Url;
///
/// let base = Url::parse("https://eid.egiz.gv.at/").unwrap();
/// assert_eq!(
///     discovery_url(&base).unwrap().as_str(),
///     "https://eid.egiz.gv.at/.well-known/openid-configuration"
/// );
/// ```
pub fn discovery_url(base_url: &Url) -> Result<Url> {
    let mut url = base_url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| {
            NativeOidcError::Discovery(format!("cannot build discovery URL from {base_url}"))
        })?
        .pop_if_empty()
        .push(".well-known")
        .push("openid-configuration");
    Ok(url)
}

/// Fetches and validates the discovery document for `base_url`.
///
/// Performs exactly one HTTP GET.
///
/// # Errors
///
/// Returns [`NativeOidcError::Discovery`] on network failure (including
/// timeouts), a non-2xx status, malformed JSON, or a missing or invalid
/// endpoint field.
pub async fn fetch_server_metadata(http: &reqwest::Client, base_url: &Url) -> Result<ServerMetadata> {
    let url = discovery_url(base_url)?;
    tracing::debug!("Fetching discovery document from {}", url);

    let resp = http.get(url.clone()).send().await.map_err(|e| {
        let reason = if e.is_timeout() { "timed out" } else { "failed" };
        NativeOidcError::Discovery(format!("metadata fetch from {url} {reason}: {e}"))
    })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(NativeOidcError::Discovery(format!(
            "discovery endpoint {url} returned {status}"
        ))
        .into());
    }

    let body = resp.text().await.map_err(|e| {
        NativeOidcError::Discovery(format!("failed to read discovery response: {e}"))
    })?;
    let document: DiscoveryDocument = serde_json::from_str(&body).map_err(|e| {
        NativeOidcError::Discovery(format!("failed to parse discovery document: {e}"))
    })?;

    let metadata = document.into_metadata()?;
    tracing::info!(
        "Resolved authorization server metadata: authorization_endpoint={}, token_endpoint={}",
        metadata.authorization_endpoint,
        metadata.token_endpoint
    );
    Ok(metadata)
}

// ---------------------------------------------------------------------------
// MetadataResolver
// ---------------------------------------------------------------------------

/// Lazily resolves and caches [`ServerMetadata`] for one authorization server.
///
/// # Examples
///
/// ```no_run
/// use native_oidc::oidc::discovery::MetadataResolver;
/// use url::Url;
///
/// # async fn example() -> native_oidc::error::Result<()> {
/// let resolver = MetadataResolver::new(
///     reqwest::Client::new(),
///     Url::parse("https://idp.example.com/")?,
/// );
/// let meta = resolver.resolve().await?;
/// println!("token endpoint: {}", meta.token_endpoint);
/// // Served from the cache; no second request.
/// let _again = resolver.resolve().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MetadataResolver {
    http: reqwest::Client,
    base_url: Url,
    cache: OnceCell<ServerMetadata>,
}

impl MetadataResolver {
    /// Creates a resolver for the authorization server at `base_url`.
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            cache: OnceCell::new(),
        }
    }

    /// Returns the cached metadata, resolving it first if necessary.
    ///
    /// When another task is already resolving, this waits for that attempt
    /// instead of issuing a second request.
    ///
    /// # Errors
    ///
    /// Returns [`NativeOidcError::Discovery`] when resolution fails. The
    /// cache stays empty, so a later call tries again.
    pub async fn resolve(&self) -> Result<&ServerMetadata> {
        self.cache
            .get_or_try_init(|| fetch_server_metadata(&self.http, &self.base_url))
            .await
    }

    /// Returns the cached metadata without triggering resolution.
    pub fn cached(&self) -> Option<&ServerMetadata> {
        self.cache.get()
    }

    /// The authorization server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
