/// Format an [`abapkit_http::HttpError`] into a message with a context prefix.
///
/// `HttpStatus` errors include only the status code. Token endpoints echo
/// parts of the request in their error bodies, so the body stays out of logs.
#[must_use]
pub fn format_http_error(e: &abapkit_http::HttpError, prefix: &str) -> String {
    use abapkit_http::HttpError;

    match e {
        HttpError::HttpStatus { status, .. } => format!("{prefix} HTTP {status}"),
        HttpError::Json(err) => format!("{prefix} JSON parse failed: {err}"),
        HttpError::Timeout(duration) => format!("{prefix} request timed out after {duration:?}"),
        HttpError::Transport(err) => format!("{prefix} transport error: {err}"),
        HttpError::BodyTooLarge { limit, actual } => {
            format!("{prefix} response too large: limit {limit} bytes, got {actual} bytes")
        }
        HttpError::Tls(err) => format!("{prefix} TLS error: {err}"),
        HttpError::RequestBuild(err) => format!("{prefix} request build failed: {err}"),
        HttpError::InvalidHeaderName(err) => format!("{prefix} invalid header name: {err}"),
        HttpError::InvalidHeaderValue(err) => format!("{prefix} invalid header value: {err}"),
        HttpError::FormEncode(err) => format!("{prefix} form encode error: {err}"),
        HttpError::Intercepted(err) => format!("{prefix} rejected: {err}"),
        HttpError::ServiceClosed => format!("{prefix} service unavailable"),
        HttpError::InvalidUri { url, reason, .. } => {
            format!("{prefix} invalid URL '{url}': {reason}")
        }
        HttpError::InvalidScheme { scheme, reason } => {
            format!("{prefix} invalid scheme '{scheme}': {reason}")
        }
        _ => format!("{prefix} request failed"),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn http_status_excludes_body() {
        let err = abapkit_http::HttpError::HttpStatus {
            status: http::StatusCode::UNAUTHORIZED,
            body_preview: r#"{"error":"invalid_client","client_secret":"leak"}"#.into(),
            content_type: None,
        };
        let msg = format_http_error(&err, "UAA token");
        assert_eq!(msg, "UAA token HTTP 401 Unauthorized");
    }

    #[test]
    fn timeout_includes_duration() {
        let err = abapkit_http::HttpError::Timeout(Duration::from_secs(30));
        assert_eq!(
            format_http_error(&err, "UAA token"),
            "UAA token request timed out after 30s"
        );
    }

    #[test]
    fn service_closed() {
        let msg = format_http_error(&abapkit_http::HttpError::ServiceClosed, "ticket");
        assert_eq!(msg, "ticket service unavailable");
    }
}
