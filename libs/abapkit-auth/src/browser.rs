//! Opening the user's browser.

use async_trait::async_trait;

use crate::error::AuthError;

/// Opens a URL for the user to complete an interactive login.
///
/// Tests substitute an implementation that issues the redirect request
/// directly.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Open `url`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Browser` if the URL cannot be opened.
    async fn open(&self, url: &str) -> Result<(), AuthError>;
}

/// Launches the platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

#[async_trait]
impl BrowserLauncher for SystemBrowser {
    async fn open(&self, url: &str) -> Result<(), AuthError> {
        let target = url.to_owned();
        tracing::info!("opening browser for login");
        tracing::debug!(url = %target, "browser target");

        tokio::task::spawn_blocking(move || webbrowser::open(&target))
            .await
            .map_err(|e| AuthError::Browser(e.to_string()))?
            .map_err(|e| AuthError::Browser(e.to_string()))
    }
}
