/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `discover`  -- resolve and print the server metadata
- `authorize` -- start an authorization attempt
- `callback`  -- resume the flow from a callback URI
- `pkce`      -- print a fresh PKCE pair

The handlers only wire configuration to the library components and print
results; the protocol logic lives in [`crate::oidc`].
*/

use std::sync::Arc;

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::launcher::UserAgentLauncher;
use crate::oidc::client::OidcClient;
use crate::preferences;

/// Builds a client from validated configuration and the given launcher.
fn build_client(config: &Config, launcher: Arc<dyn UserAgentLauncher>) -> Result<OidcClient> {
    let store = preferences::from_config(&config.preferences)?;
    OidcClient::new(
        config.client_configuration()?,
        config.flow_options(),
        store,
        launcher,
    )
}

// Discover command handler
pub mod discover {
    //! Prints the authorization server metadata.

    use super::*;
    use crate::launcher::PrintLauncher;

    /// Resolve and print the discovery metadata
    pub async fn run_discover(config: &Config, cancel: &CancellationToken) -> Result<()> {
        let client = build_client(config, Arc::new(PrintLauncher))?;
        tracing::info!(
            "Resolving metadata for {}",
            client.config().authorization_server_url
        );

        let metadata = client.metadata(cancel).await?;

        println!("{}", "Authorization server metadata".bold());
        println!(
            "  {:<24} {}",
            "authorization_endpoint",
            metadata.authorization_endpoint.cyan()
        );
        println!(
            "  {:<24} {}",
            "token_endpoint",
            metadata.token_endpoint.cyan()
        );
        let methods = metadata
            .code_challenge_methods_supported
            .as_ref()
            .map(|m| m.join(", "))
            .unwrap_or_else(|| "(not advertised)".to_string());
        println!("  {:<24} {}", "code_challenge_methods", methods);
        Ok(())
    }
}

// Authorize command handler
pub mod authorize {
    //! Starts an authorization attempt.
    //!
    //! The flow values are written to the preference store and the
    //! authorization URL is opened (or printed). The attempt is completed
    //! later by the `callback` command, typically from a fresh process.

    use super::*;
    use crate::launcher::{PrintLauncher, SystemBrowserLauncher};

    /// Build, persist and launch the authorization request
    pub async fn run_authorize(
        config: &Config,
        print_only: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let launcher: Arc<dyn UserAgentLauncher> = if print_only {
            Arc::new(PrintLauncher)
        } else {
            Arc::new(SystemBrowserLauncher)
        };
        let client = build_client(config, launcher)?;

        let request = client.begin_authorization(cancel).await?;
        let pkce = request.flow_state.pkce_verifier.is_some();

        eprintln!(
            "{}",
            format!(
                "Authorization started (pkce: {}, redirect: {})",
                pkce, request.redirect_uri
            )
            .green()
        );
        eprintln!(
            "Complete it with: {}",
            resume_hint(pkce, config.flow.use_https_redirect).cyan()
        );
        Ok(())
    }

    /// Callback command line repeating the flow flags of the attempt
    pub(crate) fn resume_hint(pkce: bool, https_redirect: bool) -> String {
        let mut hint = String::from("native-oidc");
        if pkce {
            hint.push_str(" --pkce");
        }
        if https_redirect {
            hint.push_str(" --https-redirect");
        }
        hint.push_str(" callback '<callback uri>'");
        hint
    }
}

// Callback command handler
pub mod callback {
    //! Completes an authorization attempt from its callback URI.

    use super::*;
    use crate::launcher::PrintLauncher;

    /// Validate the callback, exchange the code and call the resource
    pub async fn run_callback(config: &Config, uri: &str, cancel: &CancellationToken) -> Result<()> {
        let client = build_client(config, Arc::new(PrintLauncher))?;

        if !client.accepts_callback(uri) {
            tracing::warn!("Ignoring URI not addressed to this client: {}", uri);
            eprintln!("{}", "Not a callback for this client; ignored".yellow());
            return Ok(());
        }

        let outcome = client.handle_callback(uri, cancel).await?;

        eprintln!(
            "{}",
            format!(
                "Signed in as {}",
                outcome.claims.subject.as_deref().unwrap_or("<unknown subject>")
            )
            .green()
        );
        println!("{}", outcome.resource_body);
        Ok(())
    }
}

// PKCE command handler
pub mod pkce {
    //! Prints a freshly generated PKCE pair.

    use super::*;
    use crate::oidc::pkce as oidc_pkce;

    /// Generate and print a verifier/challenge pair
    pub fn run_pkce() -> Result<()> {
        let pair = oidc_pkce::generate()?;
        println!("{:<10} {}", "verifier".bold(), pair.verifier);
        println!("{:<10} {}", "challenge".bold(), pair.challenge);
        println!("{:<10} {}", "method".bold(), pair.method);
        Ok(())
    }
}
