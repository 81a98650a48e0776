//! Authorization code exchange
//!
//! Posts the code (and the PKCE verifier, when one was issued) to the token
//! endpoint as `application/x-www-form-urlencoded` and reads the identity
//! token from the JSON response.
//!
//! The HTTP client used here never follows redirects: a 3xx from the token
//! endpoint fails the exchange instead of re-sending the code elsewhere.

use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::FlowOptions;
use crate::error::{NativeOidcError, Result};

/// Form parameters of one token request.
#[derive(Debug, Clone, Copy)]
pub struct TokenRequest<'a> {
    /// Authorization code from the callback
    pub code: &'a str,
    /// Same redirect URI as in the authorization request
    pub redirect_uri: &'a str,
    pub client_id: &'a str,
    /// PKCE verifier; omitted from the form when `None`
    pub code_verifier: Option<&'a str>,
}

impl TokenRequest<'_> {
    fn form(&self) -> Vec<(&str, &str)> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", self.code),
            ("redirect_uri", self.redirect_uri),
            ("client_id", self.client_id),
        ];
        if let Some(verifier) = self.code_verifier {
            form.push(("code_verifier", verifier));
        }
        form
    }
}

/// Tokens returned by a successful exchange.
///
/// Never persisted. `Debug` output elides the token values.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub id_token: String,
    /// Read but unused by the flow itself
    pub access_token: Option<String>,
    /// Reported by the server; not checked
    pub token_type: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("id_token", &"<redacted>")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Raw token endpoint body; success and error members in one shape.
#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl RawTokenResponse {
    fn server_error(&self) -> Option<String> {
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => Some(format!("{error} ({description})")),
            (Some(error), None) => Some(error.clone()),
            (None, Some(description)) => Some(description.clone()),
            (None, None) => None,
        }
    }
}

/// Interprets a token endpoint response.
///
/// # Errors
///
/// Returns [`NativeOidcError::TokenExchange`] for a non-2xx status, an
/// empty body, a body that is not a JSON object, or a missing `id_token`.
/// The server's `error` / `error_description` members are included in the
/// message when present.
pub fn parse_token_response(status: StatusCode, body: &str) -> Result<TokenResponse> {
    if status.is_redirection() {
        return Err(NativeOidcError::TokenExchange(format!(
            "token endpoint answered with redirect {status}; redirects are not followed"
        ))
        .into());
    }

    let raw = if body.trim().is_empty() {
        None
    } else {
        Some(serde_json::from_str::<RawTokenResponse>(body))
    };

    if !status.is_success() {
        let detail = raw
            .and_then(|r| r.ok())
            .and_then(|r| r.server_error())
            .unwrap_or_else(|| "no error details".to_string());
        return Err(NativeOidcError::TokenExchange(format!(
            "token endpoint returned {status}: {detail}"
        ))
        .into());
    }

    let raw = match raw {
        None => {
            return Err(
                NativeOidcError::TokenExchange("token response body is empty".to_string()).into(),
            )
        }
        Some(Err(e)) => {
            return Err(NativeOidcError::TokenExchange(format!(
                "failed to parse token response: {e}"
            ))
            .into())
        }
        Some(Ok(raw)) => raw,
    };

    let server_error = raw.server_error();
    match raw.id_token {
        Some(id_token) if !id_token.is_empty() => Ok(TokenResponse {
            id_token,
            access_token: raw.access_token,
            token_type: raw.token_type,
        }),
        _ => {
            let mut message = "id_token missing from token response".to_string();
            if let Some(server_error) = server_error {
                message.push_str(&format!(": {server_error}"));
            }
            Err(NativeOidcError::TokenExchange(message).into())
        }
    }
}

/// Token endpoint client.
///
/// # Examples
///
/// ```no_run
/// use native_oidc::config::FlowOptions;
/// use native_oidc::oidc::token::{TokenExchangeClient, TokenRequest};
///
/// # async fn example() -> native_oidc::error::Result<()> {
/// let client = TokenExchangeClient::new(&FlowOptions::default())?;
/// let tokens = client
///     .exchange(
///         "https://idp.example.com/token",
///         &TokenRequest {
///             code: "ABC123",
///             redirect_uri: "com.example.notes:/oauth2redirect",
///             client_id: "notes",
///             code_verifier: None,
///         },
///     )
///     .await?;
/// println!("id_token has {} bytes", tokens.id_token.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    http: reqwest::Client,
}

impl TokenExchangeClient {
    /// Builds a client with the configured deadlines and redirects disabled.
    ///
    /// # Errors
    ///
    /// Returns [`NativeOidcError::Config`] when the HTTP client cannot be
    /// constructed (for example, TLS backend initialisation failure).
    pub fn new(options: &FlowOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                NativeOidcError::Config(format!("failed to build token HTTP client: {e}"))
            })?;
        Ok(Self { http })
    }

    /// Exchanges an authorization code at `token_endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`NativeOidcError::TokenExchange`] on network failure,
    /// timeout, or any response [`parse_token_response`] rejects.
    pub async fn exchange(
        &self,
        token_endpoint: &str,
        request: &TokenRequest<'_>,
    ) -> Result<TokenResponse> {
        tracing::debug!(
            "Exchanging authorization code at {} (pkce={})",
            token_endpoint,
            request.code_verifier.is_some()
        );

        let response = self
            .http
            .post(token_endpoint)
            .form(&request.form())
            .send()
            .await
            .map_err(|e| {
                let what = if e.is_timeout() { "timed out" } else { "failed" };
                NativeOidcError::TokenExchange(format!("token request {what}: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            NativeOidcError::TokenExchange(format!("failed to read token response: {e}"))
        })?;

        let tokens = parse_token_response(status, &body)?;
        tracing::debug!(
            "Token endpoint returned id_token (token_type={:?})",
            tokens.token_type
        );
        Ok(tokens)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
