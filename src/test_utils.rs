//! Test utilities for native-oidc
//!
//! Token builders, client configuration fixtures, and assertion helpers
//! shared by the unit tests.

use crate::config::ClientConfiguration;
use base64::Engine as _;
use url::Url;

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: crate::error::Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Build an unsigned compact JWT with the given payload
///
/// The header is `{"alg":"none"}` and the signature segment is a fixed
/// placeholder; nothing in the flow verifies it.
pub fn make_id_token_with_payload(payload: &serde_json::Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    format!(
        "{}.{}.{}",
        engine.encode(br#"{"alg":"none","typ":"JWT"}"#),
        engine.encode(payload.to_string()),
        engine.encode("signature")
    )
}

/// Build an identity token carrying `nonce`
pub fn make_id_token(nonce: &str) -> String {
    make_id_token_with_payload(&serde_json::json!({
        "iss": "https://idp.example.com/",
        "sub": "user-1",
        "aud": "https://rp.example.com/notes",
        "nonce": nonce,
    }))
}

/// Client configuration pointing at `server_url`
///
/// # Panics
///
/// Panics if `server_url` is not a valid URL
pub fn client_config_for(server_url: &str) -> ClientConfiguration {
    let base = Url::parse(server_url).expect("valid server url");
    ClientConfiguration {
        client_id: "https://rp.example.com/notes".to_string(),
        authorization_server_url: base.clone(),
        native_redirect_uri: "com.example.notes:/oauth2redirect".to_string(),
        web_redirect_uri: "https://rp.example.com/login/oauth2/code/eid".to_string(),
        resource_url: base.join("api/notes").expect("valid resource url"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NativeOidcError;

    #[test]
    fn test_assert_error_contains_success() {
        let result: crate::error::Result<()> =
            Err(NativeOidcError::Config("test error message".to_string()).into());
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        let result: crate::error::Result<()> = Ok(());
        assert_error_contains(result, "error");
    }

    #[test]
    fn test_make_id_token_has_three_segments() {
        assert_eq!(make_id_token("N").split('.').count(), 3);
    }
}
