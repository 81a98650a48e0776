//! Error types for native-oidc
//!
//! This module defines the error taxonomy of the authorization code flow,
//! using `thiserror` for ergonomic error handling. Every protocol error is
//! terminal for the authorization attempt in progress; none of them are
//! retried by the library.

use thiserror::Error;

/// Main error type for native-oidc operations
///
/// Library functions return [`Result`] (an `anyhow::Result`) and build these
/// variants with `NativeOidcError::X(..).into()`. Callers that need to react
/// to a specific failure classify it with
/// `err.downcast_ref::<NativeOidcError>()`.
#[derive(Error, Debug)]
pub enum NativeOidcError {
    /// Discovery document could not be fetched, parsed, or was incomplete
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Callback `state` did not equal the stored value
    #[error("State mismatch in authorization callback")]
    StateMismatch,

    /// Authorization server reported an error on the callback
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Token endpoint call failed or returned an unusable response
    #[error("Token exchange error: {0}")]
    TokenExchange(String),

    /// Identity token could not be parsed
    #[error("Token parse error: {0}")]
    TokenParse(String),

    /// Identity token nonce did not equal the stored nonce
    #[error("Nonce mismatch in identity token")]
    NonceMismatch,

    /// Protected resource call failed
    #[error("Resource call error: {0}")]
    ResourceCall(String),

    /// A per-flow value required by a later stage was not in the store
    #[error("Missing flow value: {0}")]
    MissingFlowValue(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Preference store failures
    #[error("Preference store error: {0}")]
    Preference(String),

    /// User-agent launcher failures
    #[error("Launcher error: {0}")]
    Launcher(String),

    /// The caller cancelled the stage
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type alias for native-oidc operations
///
/// Uses `anyhow::Error` so context can be attached while the typed
/// [`NativeOidcError`] stays recoverable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

/// Returns the [`NativeOidcError`] carried by an `anyhow::Error`, if any.
///
/// # Examples
///
/// ```
/// use native_oidc::error::{kind, NativeOidcError};
///
/// let err: anyhow::Error = NativeOidcError::StateMismatch.into();
/// assert!(matches!(kind(&err), Some(NativeOidcError::StateMismatch)));
/// ```
pub fn kind(err: &anyhow::Error) -> Option<&NativeOidcError> {
    err.downcast_ref::<NativeOidcError>()
}
