//! native-oidc - OpenID Connect relying party client
//!
//! Runs the OpenID Connect authorization code flow, optionally with PKCE,
//! against an external authorization server: metadata discovery,
//! authorization request construction, callback validation, code exchange,
//! identity token nonce checking, and a protected resource call with the
//! identity token as bearer credential.
//!
//! The surrounding application supplies two collaborators: a
//! [`PreferenceStore`](preferences::PreferenceStore) for short-lived
//! per-flow secrets and a [`UserAgentLauncher`](launcher::UserAgentLauncher)
//! that opens the authorization URL.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod launcher;
pub mod oidc;
pub mod preferences;

pub use config::{ClientConfiguration, Config, FlowOptions};
pub use error::{NativeOidcError, Result};
pub use oidc::client::{AuthorizationOutcome, OidcClient};

#[cfg(test)]
pub mod test_utils;
