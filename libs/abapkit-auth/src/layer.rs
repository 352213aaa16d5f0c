//! Tower layers that authenticate outgoing requests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use http::header::{AUTHORIZATION, HeaderName};
use http::{HeaderValue, Request, Response};
use tower::{Layer, Service};

use abapkit_http::{HttpError, OneShot};
use abapkit_utils::SecretString;

use crate::error::AuthError;

/// Header carrying a reentrance ticket.
pub const TICKET_HEADER: HeaderName = HeaderName::from_static("mysapsso2");

/// Supplies access tokens to [`BearerAuthLayer`].
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current access token, obtaining a new one if needed.
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` of a failed login or token exchange.
    async fn token(&self) -> Result<SecretString, AuthError>;
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

fn sensitive(raw: &str) -> Result<HeaderValue, HttpError> {
    let mut value = HeaderValue::from_str(raw).map_err(HttpError::InvalidHeaderValue)?;
    value.set_sensitive(true);
    Ok(value)
}

/// Injects `Authorization: Bearer <token>` into every request.
///
/// The token is fetched from the [`TokenSource`] per request, so the first
/// request triggers the login and later ones hit the source's cache.
#[derive(Clone)]
pub struct BearerAuthLayer {
    source: Arc<dyn TokenSource>,
}

impl BearerAuthLayer {
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self { source }
    }
}

impl std::fmt::Debug for BearerAuthLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            source: Arc::clone(&self.source),
        }
    }
}

/// Created by [`BearerAuthLayer`].
#[derive(Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    source: Arc<dyn TokenSource>,
}

impl<S, B, ResBody> Service<Request<B>> for BearerAuthService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    B: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = HttpError;
    type Future = BoxFuture<Result<Response<ResBody>, HttpError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // Clone-swap pattern (Tower Service contract).
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let source = Arc::clone(&self.source);

        Box::pin(async move {
            let secret = source.token().await.map_err(HttpError::intercepted)?;
            let raw = zeroize::Zeroizing::new(format!("Bearer {}", secret.expose()));
            req.headers_mut().insert(AUTHORIZATION, sensitive(&raw)?);
            inner.call(req).await
        })
    }
}

/// Sends a reentrance ticket on the first request only.
///
/// The backend answers that request with session cookies, which carry the
/// authentication from then on.
#[derive(Clone)]
pub struct TicketAuthLayer {
    ticket: SecretString,
    pending: Arc<OneShot>,
}

impl TicketAuthLayer {
    #[must_use]
    pub fn new(ticket: SecretString) -> Self {
        Self {
            ticket,
            pending: Arc::new(OneShot::new()),
        }
    }
}

impl std::fmt::Debug for TicketAuthLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketAuthLayer")
            .field("pending", &self.pending.is_armed())
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for TicketAuthLayer {
    type Service = TicketAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TicketAuthService {
            inner,
            ticket: self.ticket.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

/// Created by [`TicketAuthLayer`].
#[derive(Clone)]
pub struct TicketAuthService<S> {
    inner: S,
    ticket: SecretString,
    pending: Arc<OneShot>,
}

impl<S, B> Service<Request<B>> for TicketAuthService<S>
where
    S: Service<Request<B>, Error = HttpError>,
    S::Future: Send + 'static,
    S::Response: 'static,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = BoxFuture<Result<S::Response, HttpError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if self.pending.fire() {
            match sensitive(self.ticket.expose()) {
                Ok(value) => {
                    req.headers_mut().insert(TICKET_HEADER, value);
                }
                Err(e) => return Box::pin(async { Err(e) }),
            }
        }
        Box::pin(self.inner.call(req))
    }
}
