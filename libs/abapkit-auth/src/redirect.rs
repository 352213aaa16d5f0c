//! Loopback server that captures one browser redirect.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{AuthError, AuthFlow};
use crate::page::LOGIN_COMPLETE_HTML;

/// Upper bound for draining the server after the redirect has been handled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type ParamsSlot = Arc<Mutex<Option<oneshot::Sender<HashMap<String, String>>>>>;

/// A running loopback server waiting for the browser to hit `path`.
///
/// Only the first matching request is captured; it receives a static
/// confirmation page. Any other path answers 404. Dropping the capture
/// without calling [`wait`](Self::wait) stops the server as well.
#[derive(Debug)]
pub struct RedirectCapture {
    flow: AuthFlow,
    timeout: Duration,
    redirect_url: String,
    params_rx: oneshot::Receiver<HashMap<String, String>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl RedirectCapture {
    /// Bind `127.0.0.1` on an OS-assigned port and start serving `path`.
    ///
    /// The timeout starts counting when [`wait`](Self::wait) is called.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if `path` does not start with `/` and
    /// `AuthError::Io` if the socket cannot be bound.
    pub async fn start(flow: AuthFlow, path: &str, timeout: Duration) -> Result<Self, AuthError> {
        if !path.starts_with('/') {
            return Err(AuthError::Config(format!(
                "redirect path must start with '/': {path}"
            )));
        }

        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await?;
        let addr = listener.local_addr()?;

        let (params_tx, params_rx) = oneshot::channel();
        let slot: ParamsSlot = Arc::new(Mutex::new(Some(params_tx)));
        let app = Router::new().route(path, get(capture)).with_state(slot);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let shutdown = async {
                _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::warn!(error = %e, "redirect server stopped with error");
            }
        });

        let redirect_url = format!("http://{addr}{path}");
        tracing::debug!(%flow, url = %redirect_url, "redirect capture listening");

        Ok(Self {
            flow,
            timeout,
            redirect_url,
            params_rx,
            shutdown_tx: Some(shutdown_tx),
            server: Some(server),
        })
    }

    /// URL the browser must be redirected to.
    #[must_use]
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    /// Local port the server is bound to.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        url::Url::parse(&self.redirect_url).ok()?.port()
    }

    /// Wait for the redirect and return its query parameters.
    ///
    /// The server is shut down on every exit path.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Timeout` if no matching request arrives in time.
    pub async fn wait(mut self) -> Result<HashMap<String, String>, AuthError> {
        let outcome = tokio::time::timeout(self.timeout, &mut self.params_rx).await;
        self.shutdown().await;

        match outcome {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(_)) => Err(AuthError::InvalidResponse(
                "redirect server stopped before a request arrived".to_owned(),
            )),
            Err(_) => {
                tracing::warn!(flow = %self.flow, after = ?self.timeout, "no redirect received");
                Err(AuthError::Timeout {
                    flow: self.flow,
                    after: self.timeout,
                })
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            _ = tx.send(());
        }
        if let Some(mut server) = self.server.take()
            && tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err()
        {
            tracing::debug!("redirect server did not drain in time; aborting");
            server.abort();
        }
    }
}

impl Drop for RedirectCapture {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

async fn capture(
    State(slot): State<ParamsSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    if let Some(tx) = slot.lock().take() {
        _ = tx.send(params);
    }
    Html(LOGIN_COMPLETE_HTML)
}
