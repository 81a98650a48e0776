//! PKCE S256 challenge generation
//!
//! Implements the Proof Key for Code Exchange extension (RFC 7636) with the
//! `S256` method:
//!
//! 1. The verifier is 32 random bytes, base64url-encoded without padding
//!    (43 characters).
//! 2. The challenge is `BASE64URL(SHA256(ASCII(verifier)))`: the hash is
//!    taken over the *encoded* verifier text, not the raw bytes.
//!
//! The verifier is kept in the preference store and sent at token exchange;
//! the server recomputes the challenge from it with the same transform.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use std::fmt;

use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::oidc::random_base64url;

/// Canonical identifier of the SHA-256 challenge method
pub const CHALLENGE_METHOD_S256: &str = "S256";

/// Number of random bytes behind a code verifier
const VERIFIER_BYTES: usize = 32;

/// A PKCE S256 verifier and its derived challenge.
///
/// # Examples
///
/// ```
/// use native_oidc::oidc::pkce::{derive_challenge, generate};
///
/// let pkce = generate().expect("PKCE generation must not fail");
/// assert_eq!(pkce.method, "S256");
/// assert_eq!(pkce.verifier.len(), 43);
/// assert_eq!(derive_challenge(&pkce.verifier), pkce.challenge);
/// ```
#[derive(Clone)]
pub struct PkceChallenge {
    /// Base64url (no padding) encoding of 32 random bytes.
    pub verifier: String,

    /// Base64url (no padding) SHA-256 digest of the verifier's UTF-8 bytes.
    pub challenge: String,

    /// Always `"S256"`.
    pub method: String,
}

impl fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .field("method", &self.method)
            .finish()
    }
}

/// Generates a fresh PKCE S256 pair.
///
/// # Errors
///
/// Infallible in practice; the `Result` lets callers propagate uniformly with
/// `?` so that a flow that asked for PKCE never continues without it.
pub fn generate() -> Result<PkceChallenge> {
    let verifier = random_base64url(VERIFIER_BYTES);
    let challenge = derive_challenge(&verifier);

    Ok(PkceChallenge {
        verifier,
        challenge,
        method: CHALLENGE_METHOD_S256.to_string(),
    })
}

/// Derives the S256 challenge for an encoded verifier.
///
/// `BASE64URL-NOPAD(SHA256(verifier.as_bytes()))`
pub fn derive_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
