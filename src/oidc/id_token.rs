//! Identity token nonce binding
//!
//! Decodes the compact JWS serialization (`header.payload.signature`) far
//! enough to read the `nonce` claim and compares it with the nonce issued
//! in the authorization request.
//!
//! Only the nonce is checked. The signature, `iss`, `aud` and `exp` are NOT
//! verified here; a caller that needs to trust the token's contents must
//! verify it against the provider's keys separately.

use base64::Engine as _;
use serde_json::{Map, Value};

use crate::error::{NativeOidcError, Result};
use crate::preferences::{PreferenceStore, PREF_KEY_NONCE};

/// Claims read from an identity token payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityTokenClaims {
    pub nonce: Option<String>,
    /// `sub`, when it is a string
    pub subject: Option<String>,
    /// `iss`, when it is a string
    pub issuer: Option<String>,
}

fn decode_segment(segment: &str, name: &str) -> Result<Map<String, Value>> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| NativeOidcError::TokenParse(format!("{name} is not base64url: {e}")))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(NativeOidcError::TokenParse(format!("{name} is not a JSON object")).into()),
        Err(e) => Err(NativeOidcError::TokenParse(format!("{name} is not valid JSON: {e}")).into()),
    }
}

/// Parses the claims the flow consumes.
///
/// # Errors
///
/// Returns [`NativeOidcError::TokenParse`] when the token does not have
/// three segments, the header lacks a string `alg`, a segment is not
/// base64url JSON, or `nonce` is present but not a string.
///
/// # Examples
///
/// ```
/// use native_oidc::oidc::id_token::parse_claims;
///
/// // {"alg":"none"} . {"nonce":"N"} . (empty signature)
/// let token = "eyJhbGciOiJub25lIn0.eyJub25jZSI6Ik4ifQ.";
/// assert_eq!(parse_claims(token).unwrap().nonce.as_deref(), Some("N"));
/// ```
pub fn parse_claims(id_token: &str) -> Result<IdentityTokenClaims> {
    let parts: Vec<&str> = id_token.split('.').collect();
    if parts.len() != 3 {
        return Err(NativeOidcError::TokenParse(format!(
            "expected 3 segments, found {}",
            parts.len()
        ))
        .into());
    }

    let header = decode_segment(parts[0], "header")?;
    if !matches!(header.get("alg"), Some(Value::String(_))) {
        return Err(NativeOidcError::TokenParse("header has no alg".to_string()).into());
    }

    let payload = decode_segment(parts[1], "payload")?;
    let nonce = match payload.get("nonce") {
        None | Some(Value::Null) => None,
        Some(Value::String(nonce)) => Some(nonce.clone()),
        Some(_) => {
            return Err(NativeOidcError::TokenParse("nonce claim is not a string".to_string()).into())
        }
    };
    let string_claim = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);

    Ok(IdentityTokenClaims {
        nonce,
        subject: string_claim("sub"),
        issuer: string_claim("iss"),
    })
}

/// Compares the token nonce with the issued one.
///
/// Exact string equality; an empty or missing value on either side fails.
pub fn check_nonce(claims: &IdentityTokenClaims, expected: Option<&str>) -> Result<()> {
    match (claims.nonce.as_deref(), expected) {
        (Some(actual), Some(expected)) if !actual.is_empty() && actual == expected => Ok(()),
        _ => Err(NativeOidcError::NonceMismatch.into()),
    }
}

/// Validates the identity token nonce against the stored one.
///
/// On success the stored nonce is removed and the parsed claims are
/// returned.
///
/// # Errors
///
/// - [`NativeOidcError::TokenParse`] for a malformed token
/// - [`NativeOidcError::NonceMismatch`] when the nonces differ or either is
///   absent
/// - preference store failures
pub async fn validate_nonce(
    id_token: &str,
    store: &dyn PreferenceStore,
) -> Result<IdentityTokenClaims> {
    let claims = parse_claims(id_token)?;
    let expected = store.load_preference(PREF_KEY_NONCE).await?;

    if let Err(e) = check_nonce(&claims, expected.as_deref()) {
        tracing::warn!("Rejected identity token: nonce does not match the issued value");
        return Err(e);
    }

    store.remove_preference(PREF_KEY_NONCE).await?;
    tracing::debug!("Identity token nonce verified (sub={:?})", claims.subject);
    Ok(claims)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
