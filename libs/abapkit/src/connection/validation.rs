use std::sync::Arc;
use std::task::{Context, Poll};

use http::header::CONTENT_TYPE;
use http::{Response, Uri};
use regex::Regex;
use tower::{Layer, Service, ServiceExt};

use abapkit_http::security::ERROR_BODY_PREVIEW_LIMIT;
use abapkit_http::{HttpError, ResponseBody, buffered_body, collect_body};

use super::{BoxFuture, ConnectionState, HttpRequest, SAML_PARAM, clone_request, sniff};
use crate::error::ConnectionError;

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static SAML_PAGE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new("(?i)saml").expect("static regex should not panic"));

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static LOGIN_PAGE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new("(?i)log[io]n").expect("static regex should not panic")
});

const ERR_ID_HEADER: &str = "sap-err-id";
const LOGON_REQUIRED: &str = "ICFLOGONREQUIRED";

/// Checks responses until the first one proves the session works.
///
/// Until then, a response is rejected with [`ConnectionError`] when its
/// status is 400 or above, when the backend asks for a logon, or when it
/// is an HTML login form. A SAML login page switches the session to
/// `saml2=disabled` and the request is sent once more. The first accepted
/// response supplies the CSRF token and disarms the check.
#[derive(Clone, Debug)]
pub struct ValidationLayer {
    state: Arc<ConnectionState>,
    max_body_size: usize,
}

impl ValidationLayer {
    #[must_use]
    pub fn new(state: Arc<ConnectionState>, max_body_size: usize) -> Self {
        Self {
            state,
            max_body_size,
        }
    }
}

impl<S> Layer<S> for ValidationLayer {
    type Service = ValidationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ValidationService {
            inner,
            state: Arc::clone(&self.state),
            max_body_size: self.max_body_size,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ValidationService<S> {
    inner: S,
    state: Arc<ConnectionState>,
    max_body_size: usize,
}

enum Verdict {
    Accept(Response<ResponseBody>),
    SamlLogin,
    Reject(ConnectionError),
}

impl<S> Service<HttpRequest> for ValidationService<S>
where
    S: Service<HttpRequest, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = BoxFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: HttpRequest) -> Self::Future {
        if self.state.saml_disabled() {
            disable_saml(&mut req);
        }
        let replay = self.state.validation.is_armed().then(|| clone_request(&req));

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = Arc::clone(&self.state);
        let max_body_size = self.max_body_size;

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            let Some(replay) = replay else {
                return Ok(response);
            };

            let detect_saml = !state.saml_disabled();
            let mut replayed = false;
            loop {
                if !state.validation.is_armed() {
                    return Ok(response);
                }
                match inspect(response, detect_saml, max_body_size).await? {
                    Verdict::Accept(response) => {
                        state.capture_csrf_token(response.headers());
                        if state.validation.fire() {
                            tracing::debug!("connection validated");
                        }
                        return Ok(response);
                    }
                    Verdict::Reject(err) => {
                        tracing::debug!(status = %err.status, message = %err.message, "connection rejected");
                        return Err(HttpError::intercepted(err));
                    }
                    Verdict::SamlLogin if !replayed => {
                        tracing::info!("SAML login page received, retrying with SAML disabled");
                        state.disable_saml();
                        replayed = true;
                        let mut next = clone_request(&replay);
                        disable_saml(&mut next);
                        response = inner.ready().await?.call(next).await?;
                    }
                    Verdict::SamlLogin => {
                        return Err(HttpError::intercepted(ConnectionError::login_required(
                            "SAML login page",
                        )));
                    }
                }
            }
        })
    }
}

async fn inspect(
    response: Response<ResponseBody>,
    detect_saml: bool,
    max_body_size: usize,
) -> Result<Verdict, HttpError> {
    let status = response.status();
    if status.as_u16() >= 400 {
        return Ok(Verdict::Reject(rejection(response).await?));
    }

    let declared = is_html_declared(&response);
    if declared == Some(false) {
        return Ok(accept_or_logon(response));
    }

    let (parts, body) = response.into_parts();
    let bytes = collect_body(body, max_body_size).await?;
    let html = declared.unwrap_or_else(|| sniff::looks_like_html(&bytes));
    let response = Response::from_parts(parts, buffered_body(bytes.clone()));
    if !html {
        return Ok(accept_or_logon(response));
    }

    let text = String::from_utf8_lossy(&bytes);
    if detect_saml && SAML_PAGE.is_match(&text) {
        return Ok(Verdict::SamlLogin);
    }
    if has_logon_error(&response) {
        return Ok(Verdict::Reject(ConnectionError::login_required(LOGON_REQUIRED)));
    }
    if LOGIN_PAGE.is_match(&text) {
        return Ok(Verdict::Reject(ConnectionError::login_required("HTML login form")));
    }
    Ok(Verdict::Accept(response))
}

fn accept_or_logon(response: Response<ResponseBody>) -> Verdict {
    if has_logon_error(&response) {
        Verdict::Reject(ConnectionError::login_required(LOGON_REQUIRED))
    } else {
        Verdict::Accept(response)
    }
}

fn has_logon_error(response: &Response<ResponseBody>) -> bool {
    response
        .headers()
        .get(ERR_ID_HEADER)
        .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(LOGON_REQUIRED.as_bytes()))
}

/// `Some(is_html)` from the `content-type` header, `None` without one.
fn is_html_declared(response: &Response<ResponseBody>) -> Option<bool> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).to_ascii_lowercase().contains("text/html"))
}

async fn rejection(response: Response<ResponseBody>) -> Result<ConnectionError, HttpError> {
    let status = response.status();
    let body_preview = match collect_body(response.into_body(), ERROR_BODY_PREVIEW_LIMIT).await {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(HttpError::BodyTooLarge { .. }) => Some("<body too large for preview>".to_owned()),
        Err(e) => return Err(e),
    };
    Ok(ConnectionError {
        status,
        message: status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned(),
        body_preview,
    })
}

/// Append `saml2=disabled` unless the query already sets `saml2`.
fn disable_saml(req: &mut HttpRequest) {
    let uri = req.uri();
    let query = uri.query().unwrap_or_default();
    if query
        .split('&')
        .any(|pair| pair.split('=').next() == Some(SAML_PARAM))
    {
        return;
    }

    let path_and_query = if query.is_empty() {
        format!("{}?{SAML_PARAM}=disabled", uri.path())
    } else {
        format!("{}?{query}&{SAML_PARAM}=disabled", uri.path())
    };
    let mut parts = uri.clone().into_parts();
    let Ok(path_and_query) = path_and_query.parse() else {
        return;
    };
    parts.path_and_query = Some(path_and_query);
    if let Ok(uri) = Uri::from_parts(parts) {
        *req.uri_mut() = uri;
    }
}
