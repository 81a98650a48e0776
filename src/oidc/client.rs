//! OIDC client session object
//!
//! [`OidcClient`] owns one [`ClientConfiguration`], the metadata cache and
//! the HTTP clients, and is handed its collaborators (preference store and
//! user-agent launcher) at construction. It exposes the two halves of the
//! flow:
//!
//! - [`OidcClient::begin_authorization`] -- build the request, persist the
//!   per-flow secrets, launch the user agent.
//! - [`OidcClient::handle_callback`] -- validate the callback, exchange the
//!   code, check the identity token nonce, call the protected resource.
//!
//! The halves may run in different processes; everything they share goes
//! through the preference store.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use native_oidc::config::Config;
//! use native_oidc::launcher::SystemBrowserLauncher;
//! use native_oidc::oidc::client::OidcClient;
//! use native_oidc::preferences::FilePreferenceStore;
//!
//! # async fn example() -> native_oidc::error::Result<()> {
//! let config = Config::default();
//! let client = OidcClient::new(
//!     config.client_configuration()?,
//!     config.flow_options(),
//!     Arc::new(FilePreferenceStore::in_data_dir()?),
//!     Arc::new(SystemBrowserLauncher),
//! )?;
//!
//! let cancel = CancellationToken::new();
//! client.begin_authorization(&cancel).await?;
//! // ... later, possibly in a fresh process:
//! # let callback_uri = "";
//! let outcome = client.handle_callback(callback_uri, &cancel).await?;
//! println!("{}", outcome.resource_body);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfiguration, FlowOptions};
use crate::error::{NativeOidcError, Result};
use crate::launcher::UserAgentLauncher;
use crate::oidc::callback;
use crate::oidc::discovery::{MetadataResolver, ServerMetadata};
use crate::oidc::id_token::{self, IdentityTokenClaims};
use crate::oidc::request::{self, AuthorizationRequest};
use crate::oidc::resource::ResourceInvoker;
use crate::oidc::token::{TokenExchangeClient, TokenRequest, TokenResponse};
use crate::preferences::{PreferenceStore, PREF_KEY_VERIFIER};

/// Result of a completed authorization.
#[derive(Clone)]
pub struct AuthorizationOutcome {
    pub id_token: String,
    pub access_token: Option<String>,
    /// Claims read from the identity token (nonce already verified)
    pub claims: IdentityTokenClaims,
    /// Protected resource response body
    pub resource_body: String,
}

impl fmt::Debug for AuthorizationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationOutcome")
            .field("id_token", &"<redacted>")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("claims", &self.claims)
            .field("resource_body", &self.resource_body)
            .finish()
    }
}

/// Runs `future` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    stage: &str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("{} cancelled", stage);
            Err(NativeOidcError::Cancelled(stage.to_string()).into())
        }
        result = future => result,
    }
}

/// Relying party session for one client configuration.
///
/// Constructing the client inside a tokio runtime starts a best-effort
/// metadata prefetch. Its failure is only logged; the stages that need the
/// metadata resolve it again.
///
/// At most one authorization attempt runs at a time: the request and
/// callback stages of one client are serialized.
pub struct OidcClient {
    config: ClientConfiguration,
    options: FlowOptions,
    store: Arc<dyn PreferenceStore>,
    launcher: Arc<dyn UserAgentLauncher>,
    resolver: Arc<MetadataResolver>,
    token_client: TokenExchangeClient,
    resource: ResourceInvoker,
    attempt_lock: Mutex<()>,
    prefetch: Option<JoinHandle<()>>,
}

impl fmt::Debug for OidcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcClient")
            .field("config", &self.config)
            .field("options", &self.options)
            .field("metadata", &self.resolver.cached())
            .finish_non_exhaustive()
    }
}

impl OidcClient {
    /// Creates a client and, when a tokio runtime is running, starts the
    /// metadata prefetch.
    ///
    /// # Errors
    ///
    /// Returns [`NativeOidcError::Config`] when an HTTP client cannot be
    /// built.
    pub fn new(
        config: ClientConfiguration,
        options: FlowOptions,
        store: Arc<dyn PreferenceStore>,
        launcher: Arc<dyn UserAgentLauncher>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| NativeOidcError::Config(format!("failed to build HTTP client: {e}")))?;

        let resolver = Arc::new(MetadataResolver::new(
            http.clone(),
            config.authorization_server_url.clone(),
        ));
        let token_client = TokenExchangeClient::new(&options)?;

        let prefetch = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let resolver = Arc::clone(&resolver);
                Some(handle.spawn(async move {
                    if let Err(e) = resolver.resolve().await {
                        tracing::warn!("Metadata prefetch failed: {:#}", e);
                    }
                }))
            }
            Err(_) => {
                tracing::debug!("No tokio runtime; metadata will be resolved on first use");
                None
            }
        };

        Ok(Self {
            config,
            options,
            store,
            launcher,
            resolver,
            token_client,
            resource: ResourceInvoker::new(http),
            attempt_lock: Mutex::new(()),
            prefetch,
        })
    }

    pub fn config(&self) -> &ClientConfiguration {
        &self.config
    }

    pub fn options(&self) -> &FlowOptions {
        &self.options
    }

    /// Resolved server metadata, fetching it if the cache is empty.
    ///
    /// # Errors
    ///
    /// [`NativeOidcError::Discovery`] or [`NativeOidcError::Cancelled`].
    pub async fn metadata(&self, cancel: &CancellationToken) -> Result<&ServerMetadata> {
        cancellable(cancel, "discovery", self.resolver.resolve()).await
    }

    /// Builds the authorization request and persists its flow values,
    /// without launching anything.
    pub async fn build_authorization_request(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AuthorizationRequest> {
        let _attempt = self.attempt_lock.lock().await;
        cancellable(cancel, "authorization request", async {
            let metadata = self.resolver.resolve().await?;
            request::build_authorization_request(
                &self.config,
                &self.options,
                metadata,
                self.store.as_ref(),
            )
            .await
        })
        .await
    }

    /// Starts an authorization attempt: builds the request and hands its URL
    /// to the launcher.
    ///
    /// The flow values are persisted before the launcher sees the URL.
    ///
    /// # Errors
    ///
    /// Discovery, preference store and launcher failures, or
    /// [`NativeOidcError::Cancelled`].
    pub async fn begin_authorization(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AuthorizationRequest> {
        let request = self.build_authorization_request(cancel).await?;
        cancellable(cancel, "launch", self.launcher.launch(&request.url)).await?;
        tracing::info!("Authorization request launched");
        Ok(request)
    }

    /// Whether `uri` is a callback this client should handle.
    pub fn accepts_callback(&self, uri: &str) -> bool {
        callback::accepts_callback(&self.config, self.options.use_https_redirect, uri)
    }

    /// Completes an authorization attempt from its callback URI.
    ///
    /// # Errors
    ///
    /// The first failing stage's error: [`NativeOidcError::StateMismatch`],
    /// [`NativeOidcError::AuthorizationDenied`],
    /// [`NativeOidcError::MissingFlowValue`], [`NativeOidcError::Discovery`],
    /// [`NativeOidcError::TokenExchange`], [`NativeOidcError::TokenParse`],
    /// [`NativeOidcError::NonceMismatch`], [`NativeOidcError::ResourceCall`],
    /// or [`NativeOidcError::Cancelled`].
    pub async fn handle_callback(
        &self,
        callback_uri: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthorizationOutcome> {
        let _attempt = self.attempt_lock.lock().await;

        let code = cancellable(
            cancel,
            "callback validation",
            callback::validate_callback(callback_uri, self.store.as_ref()),
        )
        .await?;
        tracing::info!("Callback accepted");

        let tokens = cancellable(cancel, "token exchange", self.exchange_code(code.as_deref())).await?;
        tracing::info!("Authorization code exchanged");

        let claims = cancellable(
            cancel,
            "identity token validation",
            id_token::validate_nonce(&tokens.id_token, self.store.as_ref()),
        )
        .await?;
        tracing::info!("Identity token nonce verified");

        let resource_body = cancellable(
            cancel,
            "resource call",
            self.resource.invoke(&self.config.resource_url, &tokens.id_token),
        )
        .await?;
        tracing::info!("Protected resource call completed");

        Ok(AuthorizationOutcome {
            id_token: tokens.id_token,
            access_token: tokens.access_token,
            claims,
            resource_body,
        })
    }

    async fn exchange_code(&self, code: Option<&str>) -> Result<TokenResponse> {
        let code = code.ok_or_else(|| {
            NativeOidcError::TokenExchange("authorization code missing from callback".to_string())
        })?;

        // A stored verifier means the attempt used PKCE, whatever this
        // client's options say; non-PKCE attempts clear it when they start.
        let verifier = self.store.load_preference(PREF_KEY_VERIFIER).await?;
        if verifier.is_none() && self.options.enable_pkce {
            return Err(NativeOidcError::MissingFlowValue("PKCE verifier".to_string()).into());
        }

        let metadata = self.resolver.resolve().await?;
        let tokens = self
            .token_client
            .exchange(
                &metadata.token_endpoint,
                &TokenRequest {
                    code,
                    redirect_uri: self.config.redirect_uri(self.options.use_https_redirect),
                    client_id: &self.config.client_id,
                    code_verifier: verifier.as_deref(),
                },
            )
            .await?;

        if verifier.is_some() {
            self.store.remove_preference(PREF_KEY_VERIFIER).await?;
        }
        Ok(tokens)
    }
}

impl Drop for OidcClient {
    fn drop(&mut self) {
        if let Some(handle) = self.prefetch.take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
