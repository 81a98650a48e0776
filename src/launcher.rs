//! User-agent launchers
//!
//! A launcher opens the authorization URL in a browser-like surface and
//! returns nothing to the protocol core; the flow resumes only when the
//! callback URI is delivered back through
//! [`OidcClient::handle_callback`](crate::oidc::client::OidcClient::handle_callback).

use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::error::{NativeOidcError, Result};

/// Opens a URL in a user agent.
#[async_trait]
pub trait UserAgentLauncher: Send + Sync {
    /// Directs the user agent to `url`.
    async fn launch(&self, url: &Url) -> Result<()>;
}

/// Opens the system browser (`open` on macOS, `xdg-open` on Linux).
///
/// The URL is always printed to stderr as well, so the user can copy it when
/// no browser opens (and on platforms without a known opener).
#[derive(Debug, Default, Clone)]
pub struct SystemBrowserLauncher;

#[async_trait]
impl UserAgentLauncher for SystemBrowserLauncher {
    async fn launch(&self, url: &Url) -> Result<()> {
        eprintln!(
            "Open the following URL in your browser to sign in:\n{}",
            url
        );

        #[cfg(target_os = "macos")]
        let opener = Some("open");
        #[cfg(target_os = "linux")]
        let opener = Some("xdg-open");
        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        let opener: Option<&str> = None;

        if let Some(program) = opener {
            match tokio::process::Command::new(program)
                .arg(url.as_str())
                .spawn()
            {
                Ok(_) => tracing::debug!("Launched {} for authorization URL", program),
                Err(e) => tracing::warn!("Could not launch {}: {}", program, e),
            }
        }

        Ok(())
    }
}

/// Prints the URL to stdout and does nothing else.
#[derive(Debug, Default, Clone)]
pub struct PrintLauncher;

#[async_trait]
impl UserAgentLauncher for PrintLauncher {
    async fn launch(&self, url: &Url) -> Result<()> {
        println!("{}", url);
        Ok(())
    }
}

/// Records launched URLs instead of opening them.
///
/// # Examples
///
/// ```
/// use native_oidc::launcher::{RecordingLauncher, UserAgentLauncher};
/// use url::Url;
///
/// # #[tokio::main]
/// # async fn main() -> native_oidc::error::Result<()> {
/// let launcher = RecordingLauncher::default();
/// launcher.launch(&Url::parse("https://idp.example.com/auth")?).await?;
/// assert_eq!(launcher.launched()?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    urls: Mutex<Vec<Url>>,
}

impl RecordingLauncher {
    /// URLs launched so far, oldest first.
    pub fn launched(&self) -> Result<Vec<Url>> {
        let urls = self
            .urls
            .lock()
            .map_err(|_| NativeOidcError::Launcher("recording lock poisoned".to_string()))?;
        Ok(urls.clone())
    }

    /// Most recently launched URL.
    pub fn last(&self) -> Result<Option<Url>> {
        Ok(self.launched()?.pop())
    }
}

#[async_trait]
impl UserAgentLauncher for RecordingLauncher {
    async fn launch(&self, url: &Url) -> Result<()> {
        self.urls
            .lock()
            .map_err(|_| NativeOidcError::Launcher("recording lock poisoned".to_string()))?
            .push(url.clone());
        Ok(())
    }
}
