//! Command-line interface definition for native-oidc
//!
//! This module defines the CLI structure using clap's derive API. Each
//! subcommand is one UI-facing entry point into the authorization code flow.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::PreferenceBackend;

/// native-oidc - OpenID Connect relying party client
///
/// Runs the authorization code flow (optionally with PKCE) against an
/// OpenID Connect authorization server and calls a protected resource with
/// the resulting identity token.
#[derive(Parser, Debug, Clone)]
#[command(name = "native-oidc")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Send a PKCE S256 challenge (overrides config)
    #[arg(long)]
    pub pkce: bool,

    /// Use the HTTPS redirect URI instead of the native one (overrides config)
    #[arg(long)]
    pub https_redirect: bool,

    /// Preference store backend: file, keyring or memory (overrides config)
    #[arg(long)]
    pub preference_backend: Option<PreferenceBackend>,

    /// Preference file location for the file backend (overrides config)
    #[arg(long)]
    pub preference_path: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for native-oidc
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Resolve and print the authorization server metadata
    Discover,

    /// Start an authorization attempt and open the authorization URL
    Authorize {
        /// Print the URL instead of opening a browser
        #[arg(long)]
        print_only: bool,
    },

    /// Resume the flow from a callback URI delivered by the redirect
    Callback {
        /// Full callback URI including its query string
        uri: String,
    },

    /// Print a fresh PKCE verifier and challenge
    Pkce,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
