use std::collections::BTreeMap;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Response};
use tower::{Layer, Service};

use abapkit_http::{HttpError, ResponseBody};

use super::{BoxFuture, ConnectionState, HttpRequest};

/// Session cookies of one backend connection.
///
/// Only names and values are tracked. Attributes other than `Max-Age=0`
/// (which deletes the cookie) are ignored.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every `Set-Cookie` header of a response.
    pub fn ingest(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            if let Ok(raw) = value.to_str() {
                self.ingest_one(raw);
            }
        }
    }

    /// Apply a single `Set-Cookie` value.
    pub fn ingest_one(&mut self, raw: &str) {
        let mut parts = raw.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() {
            return;
        }

        let expired = parts.any(|attr| {
            attr.split_once('=').is_some_and(|(k, v)| {
                k.trim().eq_ignore_ascii_case("max-age") && v.trim() == "0"
            })
        });

        if expired {
            self.cookies.remove(name);
        } else {
            self.cookies.insert(name.to_owned(), value.to_owned());
        }
    }

    /// Value for an outgoing `Cookie` header (`"k1=v1; k2=v2"`).
    #[must_use]
    pub fn serialize(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }
}

/// Sends the jar's cookies with every request and stores every
/// `Set-Cookie` of every response.
#[derive(Clone, Debug)]
pub struct CookieLayer {
    state: Arc<ConnectionState>,
}

impl CookieLayer {
    #[must_use]
    pub fn new(state: Arc<ConnectionState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for CookieLayer {
    type Service = CookieService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CookieService {
            inner,
            state: Arc::clone(&self.state),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CookieService<S> {
    inner: S,
    state: Arc<ConnectionState>,
}

impl<S> Service<HttpRequest> for CookieService<S>
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
        if !req.headers().contains_key(COOKIE)
            && let Some(cookies) = self.state.cookie_header()
        {
            match HeaderValue::from_str(&cookies) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    req.headers_mut().insert(COOKIE, value);
                }
                Err(e) => tracing::warn!(error = %e, "session cookies are not a valid header value"),
            }
        }

        let state = Arc::clone(&self.state);
        let response = self.inner.call(req);
        Box::pin(async move {
            let response = response.await?;
            state.ingest_cookies(response.headers());
            Ok(response)
        })
    }
}
