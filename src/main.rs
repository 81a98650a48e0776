//! native-oidc - OpenID Connect relying party CLI
//!
#![doc = "native-oidc - OpenID Connect relying party CLI"]
#![doc = "Main entry point for the native-oidc application."]

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use native_oidc::cli::{Cli, Commands};
use native_oidc::commands;
use native_oidc::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Ctrl-C cancels whichever stage is running
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let result = match cli.command {
        Commands::Discover => {
            tracing::info!("Starting discovery");
            commands::discover::run_discover(&config, &cancel).await
        }
        Commands::Authorize { print_only } => {
            tracing::info!("Starting authorization request");
            if print_only {
                tracing::debug!("Printing authorization URL instead of launching a browser");
            }
            commands::authorize::run_authorize(&config, print_only, &cancel).await
        }
        Commands::Callback { uri } => {
            tracing::info!("Handling authorization callback");
            commands::callback::run_callback(&config, &uri, &cancel).await
        }
        Commands::Pkce => commands::pkce::run_pkce(),
    };

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so that command output on stdout stays clean.
fn init_tracing(verbose: bool, json_logs: bool) {
    let default_filter = if verbose {
        "native_oidc=debug"
    } else {
        "native_oidc=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
