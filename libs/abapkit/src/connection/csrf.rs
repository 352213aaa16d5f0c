use std::sync::Arc;
use std::task::{Context, Poll};

use http::{HeaderValue, Response};
use tower::{Layer, Service};

use abapkit_http::{HttpError, ResponseBody};

use super::{BoxFuture, CSRF_HEADER, ConnectionState, HttpRequest};

/// Asks for a CSRF token on the first request and sends the captured token
/// on all later ones.
///
/// A request that already carries `x-csrf-token` is left alone. The token
/// itself is captured by the validation layer.
#[derive(Clone, Debug)]
pub struct CsrfLayer {
    state: Arc<ConnectionState>,
}

impl CsrfLayer {
    #[must_use]
    pub fn new(state: Arc<ConnectionState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CsrfService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfService {
            inner,
            state: Arc::clone(&self.state),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CsrfService<S> {
    inner: S,
    state: Arc<ConnectionState>,
}

impl<S> Service<HttpRequest> for CsrfService<S>
where
    S: Service<HttpRequest, Response = Response<ResponseBody>, Error = HttpError>,
    S::Future: Send + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = BoxFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: HttpRequest) -> Self::Future {
        // Fires on the first request whether or not it carries its own token.
        let fetch = self.state.csrf_fetch.fire();

        if !req.headers().contains_key(CSRF_HEADER) {
            let value = if fetch {
                Some(HeaderValue::from_static("Fetch"))
            } else {
                self.state.csrf_token()
            };
            if let Some(value) = value {
                req.headers_mut().insert(CSRF_HEADER, value);
            }
        }

        Box::pin(self.inner.call(req))
    }
}
