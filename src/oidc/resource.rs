//! Protected resource call
//!
//! Sends `GET {resource_url}` with `Authorization: Bearer {id_token}` and
//! returns the body as text.

use url::Url;

use crate::error::{NativeOidcError, Result};

/// Returned in place of an empty response body
pub const NULL_BODY_PLACEHOLDER: &str = "<null>";

/// Calls the protected resource with the identity token as bearer credential.
#[derive(Debug, Clone)]
pub struct ResourceInvoker {
    http: reqwest::Client,
}

impl ResourceInvoker {
    /// Wraps an HTTP client that already carries the configured deadlines.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Fetches `resource_url` and returns its body.
    ///
    /// A non-2xx status is logged and its body still returned; the server
    /// decides what the body means. An empty body becomes
    /// [`NULL_BODY_PLACEHOLDER`].
    ///
    /// # Errors
    ///
    /// Returns [`NativeOidcError::ResourceCall`] on network failure, timeout,
    /// or when the body cannot be read.
    pub async fn invoke(&self, resource_url: &Url, id_token: &str) -> Result<String> {
        tracing::debug!("Calling protected resource {}", resource_url);

        let response = self
            .http
            .get(resource_url.clone())
            .bearer_auth(id_token)
            .send()
            .await
            .map_err(|e| {
                let what = if e.is_timeout() { "timed out" } else { "failed" };
                NativeOidcError::ResourceCall(format!("request to {resource_url} {what}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Protected resource {} returned {}", resource_url, status);
        }

        let body = response.text().await.map_err(|e| {
            NativeOidcError::ResourceCall(format!("failed to read resource response: {e}"))
        })?;

        if body.is_empty() {
            return Ok(NULL_BODY_PLACEHOLDER.to_string());
        }
        Ok(body)
    }
}
