//! Authorization request construction
//!
//! Generates the per-attempt secrets ([`FlowState`]), persists them in the
//! preference store, and assembles the authorization endpoint URL. No
//! network call is made here; the caller hands the URL to a
//! [`UserAgentLauncher`](crate::launcher::UserAgentLauncher).
//!
//! Query parameters, in order:
//!
//! | name                    | value                                   |
//! |-------------------------|-----------------------------------------|
//! | `response_type`         | `code`                                  |
//! | `client_id`             | configured client id                    |
//! | `scope`                 | `openid`                                |
//! | `state`                 | 16 random bytes, base64url              |
//! | `nonce`                 | 16 random bytes, base64url              |
//! | `redirect_uri`          | native or web redirect URI              |
//! | `code_challenge_method` | `S256` (PKCE only)                      |
//! | `code_challenge`        | derived from the stored verifier (PKCE) |

use std::fmt;

use url::Url;

use crate::config::{ClientConfiguration, FlowOptions};
use crate::error::{NativeOidcError, Result};
use crate::oidc::discovery::ServerMetadata;
use crate::oidc::pkce::{self, PkceChallenge};
use crate::oidc::random_base64url;
use crate::preferences::{PreferenceStore, PREF_KEY_NONCE, PREF_KEY_STATE, PREF_KEY_VERIFIER};

/// Number of random bytes behind `state` and `nonce`
const FLOW_VALUE_BYTES: usize = 16;

/// The only scope requested
pub const SCOPE_OPENID: &str = "openid";

/// Secrets issued for one authorization attempt.
///
/// Each value is fresh per attempt and consumed once by a later stage:
/// `state` by the callback, `pkce_verifier` by the token exchange, `nonce`
/// by identity token validation.
#[derive(Clone, PartialEq, Eq)]
pub struct FlowState {
    /// Anti-CSRF value round-tripped through the redirect
    pub state: String,
    /// Anti-replay value the identity token must echo
    pub nonce: String,
    /// PKCE code verifier, when PKCE is enabled
    pub pkce_verifier: Option<String>,
}

// state and nonce travel in the URL anyway; the verifier never leaves the client
impl fmt::Debug for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowState")
            .field("state", &self.state)
            .field("nonce", &self.nonce)
            .field(
                "pkce_verifier",
                &self.pkce_verifier.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// A built authorization request ready to be launched.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Full authorization endpoint URL including the query string
    pub url: Url,
    /// Secrets persisted for this attempt
    pub flow_state: FlowState,
    /// Redirect URI placed in the request; the token exchange repeats it
    pub redirect_uri: String,
}

impl FlowState {
    /// Generates fresh `state` and `nonce`, plus a PKCE pair when requested.
    ///
    /// # Errors
    ///
    /// Propagates PKCE generation failure; the flow never falls back to a
    /// request without PKCE.
    pub fn generate(enable_pkce: bool) -> Result<(Self, Option<PkceChallenge>)> {
        let pkce = if enable_pkce {
            Some(pkce::generate()?)
        } else {
            None
        };

        let flow_state = Self {
            state: random_base64url(FLOW_VALUE_BYTES),
            nonce: random_base64url(FLOW_VALUE_BYTES),
            pkce_verifier: pkce.as_ref().map(|p| p.verifier.clone()),
        };

        Ok((flow_state, pkce))
    }

    /// Writes every value under its fixed preference key.
    ///
    /// Without PKCE any verifier left by an earlier attempt is removed.
    pub async fn persist(&self, store: &dyn PreferenceStore) -> Result<()> {
        store.store_preference(PREF_KEY_STATE, &self.state).await?;
        store.store_preference(PREF_KEY_NONCE, &self.nonce).await?;
        match &self.pkce_verifier {
            Some(verifier) => store.store_preference(PREF_KEY_VERIFIER, verifier).await?,
            None => store.remove_preference(PREF_KEY_VERIFIER).await?,
        }
        Ok(())
    }
}

/// Assembles the authorization URL from already generated values.
///
/// # Errors
///
/// Returns [`NativeOidcError::Discovery`] when the published authorization
/// endpoint is not a valid URL.
///
/// # Examples
///
/// ```
/// use native_oidc::oidc::discovery::ServerMetadata;
/// use native_oidc::oidc::request::{authorization_url, FlowState};
///
/// let meta = ServerMetadata {
///     authorization_endpoint: "https://idp.example.com/auth".to_string(),
///     token_endpoint: "https://idp.example.com/token".to_string(),
///     code_challenge_methods_supported: None,
/// };
/// let flow = FlowState {
///     state: "S".to_string(),
///     nonce: "N".to_string(),
///     pkce_verifier: None,
/// };
/// let url = authorization_url(&meta, "notes", "com.example:/cb", &flow, None).unwrap();
/// assert!(url.as_str().starts_with("https://idp.example.com/auth?response_type=code"));
/// ```
pub fn authorization_url(
    metadata: &ServerMetadata,
    client_id: &str,
    redirect_uri: &str,
    flow_state: &FlowState,
    pkce: Option<&PkceChallenge>,
) -> Result<Url> {
    let mut url = Url::parse(&metadata.authorization_endpoint).map_err(|e| {
        NativeOidcError::Discovery(format!("invalid authorization endpoint URL: {e}"))
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        query.append_pair("client_id", client_id);
        query.append_pair("scope", SCOPE_OPENID);
        query.append_pair("state", &flow_state.state);
        query.append_pair("nonce", &flow_state.nonce);
        query.append_pair("redirect_uri", redirect_uri);
        if let Some(pkce) = pkce {
            query.append_pair("code_challenge_method", &pkce.method);
            query.append_pair("code_challenge", &pkce.challenge);
        }
    }

    Ok(url)
}

/// Builds an authorization request and persists its [`FlowState`].
///
/// The values are stored before this returns, so they are in place by the
/// time the URL reaches the user agent.
///
/// # Errors
///
/// Returns preference store errors, PKCE generation errors, or
/// [`NativeOidcError::Discovery`] for an unusable authorization endpoint.
pub async fn build_authorization_request(
    config: &ClientConfiguration,
    options: &FlowOptions,
    metadata: &ServerMetadata,
    store: &dyn PreferenceStore,
) -> Result<AuthorizationRequest> {
    if options.enable_pkce && !metadata.advertises_s256() {
        tracing::warn!("PKCE enabled but the authorization server does not advertise S256");
    }

    let (flow_state, pkce) = FlowState::generate(options.enable_pkce)?;
    let redirect_uri = config.redirect_uri(options.use_https_redirect).to_string();
    let url = authorization_url(
        metadata,
        &config.client_id,
        &redirect_uri,
        &flow_state,
        pkce.as_ref(),
    )?;

    flow_state.persist(store).await?;

    tracing::debug!(
        "Built authorization request (pkce={}, redirect_uri={})",
        options.enable_pkce,
        redirect_uri
    );

    Ok(AuthorizationRequest {
        url,
        flow_state,
        redirect_uri,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
