//! Configuration management for native-oidc
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! The validated result is split into the immutable
//! [`ClientConfiguration`] handed to the protocol core and the
//! [`FlowOptions`] that tune how a flow runs.

use crate::error::{NativeOidcError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Upper bound accepted for any configured timeout, in seconds
const MAX_TIMEOUT_SECONDS: u64 = 600;

/// Main configuration structure for native-oidc
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Relying party registration at the authorization server
    #[serde(default)]
    pub client: ClientSettings,

    /// Per-flow behavior switches
    #[serde(default)]
    pub flow: FlowConfig,

    /// HTTP timeouts
    #[serde(default)]
    pub http: HttpConfig,

    /// Where per-flow secrets are kept between stages
    #[serde(default)]
    pub preferences: PreferencesConfig,
}

/// Relying party settings as registered with the authorization server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// OAuth `client_id`
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Base URL of the authorization server (issuer)
    #[serde(default = "default_authorization_server_url")]
    pub authorization_server_url: String,

    /// Custom-scheme redirect URI delivered back to this application
    #[serde(default = "default_native_redirect_uri")]
    pub native_redirect_uri: String,

    /// HTTPS redirect URI used instead of the native one when requested
    #[serde(default = "default_web_redirect_uri")]
    pub web_redirect_uri: String,

    /// Protected resource called with the identity token
    #[serde(default = "default_resource_url")]
    pub resource_url: String,
}

fn default_client_id() -> String {
    "https://eid.a-sit.at/notes".to_string()
}

fn default_authorization_server_url() -> String {
    "https://eid.egiz.gv.at/".to_string()
}

fn default_native_redirect_uri() -> String {
    "at.asitplus.notes.app:/oauth2redirect".to_string()
}

fn default_web_redirect_uri() -> String {
    "https://eid.a-sit.at/notes/login/oauth2/code/eid".to_string()
}

fn default_resource_url() -> String {
    "https://eid.a-sit.at/notes-api/".to_string()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            authorization_server_url: default_authorization_server_url(),
            native_redirect_uri: default_native_redirect_uri(),
            web_redirect_uri: default_web_redirect_uri(),
            resource_url: default_resource_url(),
        }
    }
}

/// Flow switches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Send a PKCE `S256` challenge and verifier
    #[serde(default)]
    pub enable_pkce: bool,

    /// Use the HTTPS redirect URI instead of the native one
    #[serde(default)]
    pub use_https_redirect: bool,
}

/// HTTP client timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Total deadline per request (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Connect deadline per request (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// Preference store backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceBackend {
    /// JSON file on disk; survives process restarts
    #[default]
    File,
    /// OS credential store
    Keyring,
    /// Process memory only
    Memory,
}

impl FromStr for PreferenceBackend {
    type Err = NativeOidcError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(NativeOidcError::Config(format!(
                "Invalid preference backend: {}. Must be one of: file, keyring, memory",
                other
            ))),
        }
    }
}

/// Preference store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesConfig {
    /// Which backend holds state, nonce and verifier
    #[serde(default)]
    pub backend: PreferenceBackend,

    /// File location for the `file` backend; defaults to the platform data
    /// directory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Immutable relying party configuration consumed by the protocol core
///
/// Created once from a validated [`Config`] and never mutated afterwards.
///
/// # Examples
///
/// ```
/// use native_oidc::config::ClientConfiguration;
/// use url::Url;
///
/// let client = ClientConfiguration {
///     client_id: "notes".to_string(),
///     authorization_server_url: Url::parse("https://idp.example.com/").unwrap(),
///     native_redirect_uri: "com.example.notes:/oauth2redirect".to_string(),
///     web_redirect_uri: "https://rp.example.com/callback".to_string(),
///     resource_url: Url::parse("https://rp.example.com/api/").unwrap(),
/// };
///
/// assert_eq!(client.native_url_scheme(), Some("com.example.notes"));
/// assert_eq!(client.redirect_uri(true), "https://rp.example.com/callback");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfiguration {
    /// OAuth `client_id`
    pub client_id: String,
    /// Authorization server base URL
    pub authorization_server_url: Url,
    /// Custom-scheme redirect URI
    pub native_redirect_uri: String,
    /// HTTPS redirect URI
    pub web_redirect_uri: String,
    /// Protected resource URL
    pub resource_url: Url,
}

impl ClientConfiguration {
    /// Selects the redirect URI for a flow.
    pub fn redirect_uri(&self, use_https_redirect: bool) -> &str {
        if use_https_redirect {
            &self.web_redirect_uri
        } else {
            &self.native_redirect_uri
        }
    }

    /// Scheme component of the native redirect URI.
    pub fn native_url_scheme(&self) -> Option<&str> {
        self.native_redirect_uri
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .filter(|scheme| !scheme.is_empty())
    }
}

/// Runtime switches for one [`OidcClient`](crate::oidc::client::OidcClient)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOptions {
    /// Send a PKCE challenge and verifier
    pub enable_pkce: bool,
    /// Redirect to the HTTPS URI instead of the native one
    pub use_https_redirect: bool,
    /// Total deadline per HTTP request
    pub timeout: Duration,
    /// Connect deadline per HTTP request
    pub connect_timeout: Duration,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            enable_pkce: false,
            use_https_redirect: false,
            timeout: Duration::from_secs(default_timeout()),
            connect_timeout: Duration::from_secs(default_connect_timeout()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load configuration from file, environment and CLI overrides
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns [`NativeOidcError::Config`] when the file exists but cannot be
    /// read or parsed.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            client: ClientSettings::default(),
            flow: FlowConfig::default(),
            http: HttpConfig::default(),
            preferences: PreferencesConfig::default(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| NativeOidcError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| NativeOidcError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(client_id) = std::env::var("NATIVE_OIDC_CLIENT_ID") {
            self.client.client_id = client_id;
        }

        if let Ok(server_url) = std::env::var("NATIVE_OIDC_AUTHORIZATION_SERVER_URL") {
            self.client.authorization_server_url = server_url;
        }

        if let Ok(redirect) = std::env::var("NATIVE_OIDC_NATIVE_REDIRECT_URI") {
            self.client.native_redirect_uri = redirect;
        }

        if let Ok(redirect) = std::env::var("NATIVE_OIDC_WEB_REDIRECT_URI") {
            self.client.web_redirect_uri = redirect;
        }

        if let Ok(resource) = std::env::var("NATIVE_OIDC_RESOURCE_URL") {
            self.client.resource_url = resource;
        }

        if let Ok(pkce) = std::env::var("NATIVE_OIDC_ENABLE_PKCE") {
            match parse_bool(&pkce) {
                Some(value) => self.flow.enable_pkce = value,
                None => tracing::warn!("Invalid NATIVE_OIDC_ENABLE_PKCE: {}", pkce),
            }
        }

        if let Ok(https) = std::env::var("NATIVE_OIDC_USE_HTTPS_REDIRECT") {
            match parse_bool(&https) {
                Some(value) => self.flow.use_https_redirect = value,
                None => tracing::warn!("Invalid NATIVE_OIDC_USE_HTTPS_REDIRECT: {}", https),
            }
        }

        if let Ok(timeout) = std::env::var("NATIVE_OIDC_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.http.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid NATIVE_OIDC_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(backend) = std::env::var("NATIVE_OIDC_PREFERENCE_BACKEND") {
            match backend.parse::<PreferenceBackend>() {
                Ok(value) => self.preferences.backend = value,
                Err(e) => tracing::warn!("Ignoring NATIVE_OIDC_PREFERENCE_BACKEND: {}", e),
            }
        }

        if let Ok(path) = std::env::var("NATIVE_OIDC_PREFERENCE_PATH") {
            self.preferences.path = Some(PathBuf::from(path));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.pkce {
            self.flow.enable_pkce = true;
        }
        if cli.https_redirect {
            self.flow.use_https_redirect = true;
        }
        if let Some(backend) = cli.preference_backend {
            self.preferences.backend = backend;
        }
        if let Some(path) = &cli.preference_path {
            self.preferences.path = Some(path.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`NativeOidcError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.client.client_id.trim().is_empty() {
            return Err(NativeOidcError::Config("client_id cannot be empty".to_string()).into());
        }

        parse_http_url("authorization_server_url", &self.client.authorization_server_url)?;
        parse_http_url("resource_url", &self.client.resource_url)?;
        parse_http_url("web_redirect_uri", &self.client.web_redirect_uri)?;

        let native = Url::parse(&self.client.native_redirect_uri).map_err(|e| {
            NativeOidcError::Config(format!(
                "native_redirect_uri is not a valid URI: {}: {}",
                self.client.native_redirect_uri, e
            ))
        })?;
        if matches!(native.scheme(), "http" | "https") {
            return Err(NativeOidcError::Config(format!(
                "native_redirect_uri must use a custom scheme, got {}",
                native.scheme()
            ))
            .into());
        }

        validate_timeout("http.timeout_seconds", self.http.timeout_seconds)?;
        validate_timeout(
            "http.connect_timeout_seconds",
            self.http.connect_timeout_seconds,
        )?;

        Ok(())
    }

    /// Build the immutable client configuration
    ///
    /// # Errors
    ///
    /// Returns [`NativeOidcError::Config`] when a URL field does not parse.
    pub fn client_configuration(&self) -> Result<ClientConfiguration> {
        Ok(ClientConfiguration {
            client_id: self.client.client_id.clone(),
            authorization_server_url: parse_http_url(
                "authorization_server_url",
                &self.client.authorization_server_url,
            )?,
            native_redirect_uri: self.client.native_redirect_uri.clone(),
            web_redirect_uri: self.client.web_redirect_uri.clone(),
            resource_url: parse_http_url("resource_url", &self.client.resource_url)?,
        })
    }

    /// Runtime options derived from the `flow` and `http` sections
    pub fn flow_options(&self) -> FlowOptions {
        FlowOptions {
            enable_pkce: self.flow.enable_pkce,
            use_https_redirect: self.flow.use_https_redirect,
            timeout: Duration::from_secs(self.http.timeout_seconds),
            connect_timeout: Duration::from_secs(self.http.connect_timeout_seconds),
        }
    }
}

fn parse_http_url(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value).map_err(|e| {
        NativeOidcError::Config(format!("{} is not a valid URL: {}: {}", field, value, e))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(NativeOidcError::Config(format!(
            "{} must be an http(s) URL, got {}",
            field, value
        ))
        .into());
    }
    Ok(url)
}

fn validate_timeout(field: &str, seconds: u64) -> Result<()> {
    if seconds == 0 {
        return Err(NativeOidcError::Config(format!("{} must be greater than 0", field)).into());
    }
    if seconds > MAX_TIMEOUT_SECONDS {
        return Err(NativeOidcError::Config(format!(
            "{} must be less than or equal to {}",
            field, MAX_TIMEOUT_SECONDS
        ))
        .into());
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
