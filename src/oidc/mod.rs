//! OpenID Connect authorization code flow (relying party side)
//!
//! The stages run in this order, each consuming what the previous one
//! produced plus values read back from the
//! [`PreferenceStore`](crate::preferences::PreferenceStore):
//!
//! ```text
//! discovery -> request -> (browser redirect) -> callback -> token -> id_token -> resource
//! ```
//!
//! # Module Layout
//!
//! - [`discovery`] -- discovery document resolution and caching
//! - [`pkce`]      -- PKCE `S256` verifier/challenge generation
//! - [`request`]   -- authorization request URL and per-flow secrets
//! - [`callback`]  -- callback `state` validation
//! - [`token`]     -- authorization code exchange
//! - [`id_token`]  -- identity token nonce binding
//! - [`resource`]  -- protected resource call with the identity token
//! - [`client`]    -- [`OidcClient`](client::OidcClient), the session object
//!   wiring the stages together

pub mod callback;
pub mod client;
pub mod discovery;
pub mod id_token;
pub mod pkce;
pub mod request;
pub mod resource;
pub mod token;

use base64::Engine as _;

/// Returns `len` cryptographically random bytes encoded as base64url without
/// padding.
pub(crate) fn random_base64url(len: usize) -> String {
    use rand::RngCore as _;

    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
