//! SAML reentrance ticket flow.
//!
//! The browser is sent to the system's reentrance endpoint, the user logs in
//! through the identity provider, and the system redirects back to the local
//! server with a `reentrance-ticket` query parameter. The ticket is then sent
//! once in the `MYSAPSSO2` header (see [`TicketAuthLayer`](crate::TicketAuthLayer)).

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use abapkit_utils::SecretString;

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::error::{AuthError, AuthFlow};
use crate::redirect::RedirectCapture;

const REENTRANCE_PATH: &str = "/sap/bc/sec/reentrance";
const REDIRECT_PATH: &str = "/redirect";
const TICKET_PARAM: &str = "reentrance-ticket";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Obtains a reentrance ticket for an ABAP system through the browser.
pub struct ReentranceTicket {
    browser: Arc<dyn BrowserLauncher>,
    timeout: Duration,
}

impl Default for ReentranceTicket {
    fn default() -> Self {
        Self {
            browser: Arc::new(SystemBrowser),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ReentranceTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReentranceTicket")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ReentranceTicket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    /// How long to wait for the browser redirect.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the flow for the system at `backend_url`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` for an unusable URL, `AuthError::Timeout`
    /// if the browser never redirects back and `AuthError::InvalidResponse`
    /// if the redirect carries no ticket.
    pub async fn get(&self, backend_url: &str) -> Result<SecretString, AuthError> {
        let ui = ui_url(backend_url)?;
        let capture =
            RedirectCapture::start(AuthFlow::ReentranceTicket, REDIRECT_PATH, self.timeout).await?;

        let mut target = ui
            .join(REENTRANCE_PATH)
            .map_err(|e| AuthError::Config(format!("invalid backend url: {e}")))?;
        target
            .query_pairs_mut()
            .append_pair("scenario", "FTO1")
            .append_pair("redirect-url", capture.redirect_url());

        self.browser.open(target.as_str()).await?;
        let params = capture.wait().await?;

        params
            .get(TICKET_PARAM)
            .filter(|t| !t.is_empty())
            .map(|t| SecretString::new(t.as_str()))
            .ok_or_else(|| {
                AuthError::InvalidResponse(format!("redirect did not carry a {TICKET_PARAM}"))
            })
    }
}

/// Host serving the login UI of a system.
///
/// ABAP environments on BTP serve their UI from an `.abap-web.` host next
/// to the `.abap.` API host; other systems use the same host for both.
///
/// # Errors
///
/// Returns `AuthError::Config` if `backend_url` is not an absolute URL with a host.
pub fn ui_url(backend_url: &str) -> Result<Url, AuthError> {
    let mut url =
        Url::parse(backend_url).map_err(|e| AuthError::Config(format!("invalid backend url: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| AuthError::Config(format!("backend url has no host: {backend_url}")))?
        .to_owned();

    if host.contains(".abap.") {
        let web_host = host.replacen(".abap.", ".abap-web.", 1);
        url.set_host(Some(&web_host))
            .map_err(|e| AuthError::Config(format!("invalid UI host: {e}")))?;
    }
    url.set_path("/");
    url.set_query(None);
    Ok(url)
}
