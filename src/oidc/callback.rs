//! Authorization callback validation
//!
//! The callback dispatcher (OS URL handler, HTTPS route, or the `callback`
//! CLI command) hands over the full redirect URI. Its `state` parameter must
//! equal the value stored when the request was built; only then is the
//! `code` passed on to the token exchange.

use url::form_urlencoded;

use crate::config::ClientConfiguration;
use crate::error::{NativeOidcError, Result};
use crate::preferences::{PreferenceStore, PREF_KEY_STATE};

/// Query parameters read from a callback URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParameters {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParameters {
    /// Extracts the parameters from the query component of `uri`.
    ///
    /// Custom-scheme URIs are accepted as-is; anything after `#` is ignored.
    /// Repeated keys keep their first value.
    pub fn parse(uri: &str) -> Self {
        let without_fragment = uri.split_once('#').map_or(uri, |(head, _)| head);
        let query = without_fragment
            .split_once('?')
            .map_or("", |(_, query)| query);

        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }

    /// Server-reported failure, if the callback carries one.
    pub fn denial(&self) -> Option<String> {
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => Some(format!("{error}: {description}")),
            (Some(error), None) => Some(error.clone()),
            (None, Some(description)) => Some(description.clone()),
            (None, None) => None,
        }
    }
}

/// Compares the callback `state` with the stored one.
///
/// Plain string equality; a missing value on either side fails.
pub fn check_state(received: Option<&str>, stored: Option<&str>) -> Result<()> {
    match (received, stored) {
        (Some(received), Some(stored)) if received == stored => Ok(()),
        _ => Err(NativeOidcError::StateMismatch.into()),
    }
}

/// Validates a callback URI against the stored `state`.
///
/// Returns the `code` parameter unchanged; its absence is reported by the
/// token exchange, not here. Once the state matches it is removed from the
/// store, so the same callback cannot be replayed. A mismatching callback
/// leaves the stored state untouched.
///
/// # Errors
///
/// - [`NativeOidcError::StateMismatch`] when the states differ or either is
///   absent
/// - [`NativeOidcError::AuthorizationDenied`] when the state matches but the
///   server reported `error` or `error_description`
/// - preference store failures
pub async fn validate_callback(uri: &str, store: &dyn PreferenceStore) -> Result<Option<String>> {
    let params = CallbackParameters::parse(uri);
    let stored = store.load_preference(PREF_KEY_STATE).await?;

    if let Err(e) = check_state(params.state.as_deref(), stored.as_deref()) {
        tracing::warn!(
            "Rejected callback: state {}",
            if params.state.is_none() { "missing" } else { "does not match" }
        );
        return Err(e);
    }

    store.remove_preference(PREF_KEY_STATE).await?;

    if let Some(reason) = params.denial() {
        return Err(NativeOidcError::AuthorizationDenied(reason).into());
    }

    tracing::debug!("Callback state verified");
    Ok(params.code)
}

/// Whether a URI is a callback addressed to this client.
///
/// In native mode the URI must use the native redirect scheme; in HTTPS
/// mode it must start with the web redirect URI.
pub fn accepts_callback(config: &ClientConfiguration, use_https_redirect: bool, uri: &str) -> bool {
    if use_https_redirect {
        return uri.starts_with(config.web_redirect_uri.as_str());
    }

    match (config.native_url_scheme(), uri.split_once(':')) {
        (Some(expected), Some((scheme, _))) => scheme.eq_ignore_ascii_case(expected),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::MemoryPreferenceStore;
    use url::Url;

    fn client_config() -> ClientConfiguration {
        ClientConfiguration {
            client_id: "notes".to_string(),
            authorization_server_url: Url::parse("https://idp.example.com/").unwrap(),
            native_redirect_uri: "com.example.notes:/oauth2redirect".to_string(),
            web_redirect_uri: "https://rp.example.com/login/oauth2/code/eid".to_string(),
            resource_url: Url::parse("https://rp.example.com/api/").unwrap(),
        }
    }

    async fn store_with_state(state: &str) -> MemoryPreferenceStore {
        let store = MemoryPreferenceStore::new();
        store.store_preference(PREF_KEY_STATE, state).await.unwrap();
        store
    }

    #[test]
    fn test_parse_native_scheme_uri() {
        let params =
            CallbackParameters::parse("com.example.notes:/oauth2redirect?state=abc&code=ABC123");
        assert_eq!(params.state.as_deref(), Some("abc"));
        assert_eq!(params.code.as_deref(), Some("ABC123"));
        assert!(params.denial().is_none());
    }

    #[test]
    fn test_parse_decodes_and_ignores_fragment() {
        let params = CallbackParameters::parse(
            "https://rp.example.com/cb?error=access_denied&error_description=User+said+no%21#frag",
        );
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("User said no!"));
        assert_eq!(params.denial().as_deref(), Some("access_denied: User said no!"));
    }

    #[test]
    fn test_parse_without_query() {
        assert_eq!(
            CallbackParameters::parse("com.example.notes:/oauth2redirect"),
            CallbackParameters::default()
        );
    }

    #[test]
    fn test_parse_keeps_first_repeated_value() {
        let params = CallbackParameters::parse("x:/cb?state=first&state=second");
        assert_eq!(params.state.as_deref(), Some("first"));
    }

    #[test]
    fn test_check_state() {
        assert!(check_state(Some("abc"), Some("abc")).is_ok());
        assert!(check_state(Some("xyz"), Some("abc")).is_err());
        assert!(check_state(None, Some("abc")).is_err());
        assert!(check_state(Some("abc"), None).is_err());
        assert!(check_state(None, None).is_err());
        assert!(check_state(Some("ABC"), Some("abc")).is_err());
    }

    #[tokio::test]
    async fn test_validate_matching_state_returns_code() {
        let store = store_with_state("abc").await;
        let code = validate_callback("com.example.notes:/cb?state=abc&code=ABC123", &store)
            .await
            .unwrap();
        assert_eq!(code.as_deref(), Some("ABC123"));
    }

    #[tokio::test]
    async fn test_validate_consumes_state() {
        let store = store_with_state("abc").await;
        validate_callback("com.example.notes:/cb?state=abc&code=ABC123", &store)
            .await
            .unwrap();

        assert!(store.load_preference(PREF_KEY_STATE).await.unwrap().is_none());
        let replay = validate_callback("com.example.notes:/cb?state=abc&code=ABC123", &store)
            .await
            .unwrap_err();
        assert!(matches!(
            replay.downcast_ref::<NativeOidcError>(),
            Some(NativeOidcError::StateMismatch)
        ));
    }

    #[tokio::test]
    async fn test_validate_wrong_state_is_mismatch() {
        let store = store_with_state("abc").await;
        let err = validate_callback("com.example.notes:/cb?state=xyz&code=ABC123", &store)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NativeOidcError>(),
            Some(NativeOidcError::StateMismatch)
        ));
        assert_eq!(
            store.load_preference(PREF_KEY_STATE).await.unwrap().as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn test_validate_missing_state_is_mismatch() {
        let store = store_with_state("abc").await;
        let err = validate_callback("com.example.notes:/cb?code=ABC123", &store)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NativeOidcError>(),
            Some(NativeOidcError::StateMismatch)
        ));
    }

    #[tokio::test]
    async fn test_validate_without_stored_state_is_mismatch() {
        let store = MemoryPreferenceStore::new();
        let err = validate_callback("com.example.notes:/cb?state=abc&code=ABC123", &store)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NativeOidcError>(),
            Some(NativeOidcError::StateMismatch)
        ));
    }

    #[tokio::test]
    async fn test_validate_passes_missing_code_through() {
        let store = store_with_state("abc").await;
        let code = validate_callback("com.example.notes:/cb?state=abc", &store)
            .await
            .unwrap();
        assert!(code.is_none());
    }

    #[tokio::test]
    async fn test_validate_reports_denial_after_state_check() {
        let store = store_with_state("abc").await;
        let err = validate_callback(
            "com.example.notes:/cb?state=abc&error_description=Login+aborted",
            &store,
        )
        .await
        .unwrap_err();
        match err.downcast_ref::<NativeOidcError>() {
            Some(NativeOidcError::AuthorizationDenied(reason)) => {
                assert_eq!(reason, "Login aborted")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validate_denial_with_wrong_state_is_mismatch() {
        let store = store_with_state("abc").await;
        let err = validate_callback("com.example.notes:/cb?state=xyz&error=access_denied", &store)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NativeOidcError>(),
            Some(NativeOidcError::StateMismatch)
        ));
    }

    #[test]
    fn test_accepts_native_scheme_only_in_native_mode() {
        let config = client_config();
        assert!(accepts_callback(
            &config,
            false,
            "com.example.notes:/oauth2redirect?state=a&code=b"
        ));
        assert!(!accepts_callback(&config, false, "com.other.app:/oauth2redirect?code=b"));
        assert!(!accepts_callback(
            &config,
            false,
            "https://rp.example.com/login/oauth2/code/eid?code=b"
        ));
    }

    #[test]
    fn test_accepts_web_prefix_only_in_https_mode() {
        let config = client_config();
        assert!(accepts_callback(
            &config,
            true,
            "https://rp.example.com/login/oauth2/code/eid?state=a&code=b"
        ));
        assert!(!accepts_callback(&config, true, "https://evil.example.com/?code=b"));
        assert!(!accepts_callback(&config, true, "com.example.notes:/oauth2redirect?code=b"));
    }
}
