use std::sync::Arc;
use std::task::{Context, Poll};

use base64::{Engine as _, engine::general_purpose};
use http::header::AUTHORIZATION;
use http::{HeaderValue, Response};
use tower::{Layer, Service};
use zeroize::Zeroizing;

use abapkit_http::{HttpError, ResponseBody};

use super::{BoxFuture, ConnectionState, HttpRequest};

/// Sends `Authorization: Basic …` while the session holds credentials and
/// drops them after the first response below 400.
#[derive(Clone, Debug)]
pub struct BasicAuthLayer {
    state: Arc<ConnectionState>,
}

impl BasicAuthLayer {
    #[must_use]
    pub fn new(state: Arc<ConnectionState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for BasicAuthLayer {
    type Service = BasicAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BasicAuthService {
            inner,
            state: Arc::clone(&self.state),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BasicAuthService<S> {
    inner: S,
    state: Arc<ConnectionState>,
}

fn basic_header(username: &str, password: &str) -> Result<HeaderValue, HttpError> {
    let credentials = Zeroizing::new(format!("{username}:{password}"));
    let encoded = Zeroizing::new(general_purpose::STANDARD.encode(credentials.as_bytes()));
    let raw = Zeroizing::new(format!("Basic {}", &*encoded));
    let mut value = HeaderValue::from_str(&raw).map_err(HttpError::InvalidHeaderValue)?;
    value.set_sensitive(true);
    Ok(value)
}

impl<S> Service<HttpRequest> for BasicAuthService<S>
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
        if !req.headers().contains_key(AUTHORIZATION)
            && let Some((username, password)) = self.state.credentials()
        {
            match basic_header(&username, password.expose()) {
                Ok(value) => {
                    req.headers_mut().insert(AUTHORIZATION, value);
                }
                Err(e) => return Box::pin(async { Err(e) }),
            }
        }

        let state = Arc::clone(&self.state);
        let response = self.inner.call(req);
        Box::pin(async move {
            let response = response.await?;
            if response.status().as_u16() < 400
                && state.has_credentials()
                && state.credentials_released.fire()
            {
                state.release_credentials();
                tracing::debug!("basic auth credentials released after first successful response");
            }
            Ok(response)
        })
    }
}
