use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use tower::buffer::Buffer;

/// Future type of the type-erased inner service
pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// Buffered service shared by all clones of an [`HttpClient`]
pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// HTTP client with tower middleware stack
///
/// `HttpClient` is `Clone + Send + Sync`; cloning is a channel clone. All
/// clones share one connection pool and one interceptor stack, so state kept
/// by interceptors (cookies, CSRF token) is shared as well.
///
/// Use [`HttpClientBuilder`] to construct instances with custom configuration.
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: BufferedService,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Create a request builder for an arbitrary method
    ///
    /// The URL must be absolute. Query parameters are encoded into it by the
    /// caller (e.g. via `url::Url`).
    pub fn request(&self, method: http::Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(
            self.service.clone(),
            self.max_body_size,
            method,
            url.to_owned(),
            self.transport_security,
        )
    }

    /// Create a GET request builder
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::GET, url)
    }

    /// Create a POST request builder
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::POST, url)
    }

    /// Create a PUT request builder
    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::PUT, url)
    }

    /// Create a PATCH request builder
    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::PATCH, url)
    }

    /// Create a DELETE request builder
    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::DELETE, url)
    }

    /// Maximum body size enforced by the response readers
    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("max_body_size", &self.max_body_size)
            .field("transport_security", &self.transport_security)
            .finish_non_exhaustive()
    }
}

/// Map buffer errors to `HttpError`
///
/// The buffer either forwards the inner service error or reports that its
/// worker is gone.
pub fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "buffer worker closed unexpectedly; service unavailable"
            );
            HttpError::ServiceClosed
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::HttpService;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn test_client() -> HttpClient {
        HttpClientBuilder::new()
            .allow_insecure_http()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_http_client_get() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/sap/bc/ui2/app_index/");
            then.status(200).json_body(json!({"results": []}));
        });

        let client = test_client();
        let url = format!("{}/sap/bc/ui2/app_index/", server.base_url());
        let resp = client.get(&url).send().await.unwrap();

        assert_eq!(resp.status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_http_client_post_form() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth/token")
                .header("content-type", "application/x-www-form-urlencoded")
                .body("grant_type=refresh_token&refresh_token=abc");
            then.status(200).json_body(json!({"access_token": "t"}));
        });

        let client = test_client();
        let url = format!("{}/oauth/token", server.base_url());

        let resp = client
            .post(&url)
            .form(&[("grant_type", "refresh_token"), ("refresh_token", "abc")])
            .unwrap()
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_put_and_delete() {
        let server = MockServer::start();
        let put = server.mock(|when, then| {
            when.method(PUT).path("/Repositories('APP')");
            then.status(204);
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/Repositories('APP')");
            then.status(204);
        });

        let client = test_client();
        let url = format!("{}/Repositories('APP')", server.base_url());
        client.put(&url).body_string("<entry/>".to_owned()).send().await.unwrap();
        client.delete(&url).send().await.unwrap();

        put.assert();
        delete.assert();
    }

    #[tokio::test]
    async fn test_body_size_limit() {
        let server = MockServer::start();
        let large_body = "x".repeat(64 * 1024);
        let _m = server.mock(|when, then| {
            when.method(GET).path("/large");
            then.status(200).body(&large_body);
        });

        let client = HttpClientBuilder::new()
            .allow_insecure_http()
            .max_body_size(1024)
            .build()
            .unwrap();

        let url = format!("{}/large", server.base_url());
        let result = client.get(&url).send().await.unwrap().bytes().await;

        assert!(matches!(result, Err(HttpError::BodyTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_default_headers_sent() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET)
                .path("/test")
                .header("user-agent", "abap-cli/1.0")
                .header("sap-client", "100");
            then.status(200);
        });

        let client = HttpClientBuilder::new()
            .allow_insecure_http()
            .user_agent("abap-cli/1.0")
            .default_header("sap-client", "100")
            .build()
            .unwrap();

        let url = format!("{}/test", server.base_url());
        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), http::StatusCode::OK);
        m.assert();
    }

    #[tokio::test]
    async fn test_non_2xx_is_ok_until_checked() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/error");
            then.status(404)
                .header("content-type", "application/json")
                .body(r#"{"error": "not found"}"#);
        });

        let client = test_client();
        let url = format!("{}/error", server.base_url());

        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);

        match resp.json::<serde_json::Value>().await {
            Err(HttpError::HttpStatus {
                status,
                body_preview,
                content_type,
            }) => {
                assert_eq!(status, http::StatusCode::NOT_FOUND);
                assert!(body_preview.contains("not found"));
                assert_eq!(content_type, Some("application/json".to_owned()));
            }
            other => panic!("Expected HttpStatus error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_follows_redirect_to_other_origin_without_credentials() {
        let idp = MockServer::start();
        let login_page = idp.mock(|when, then| {
            when.method(GET).path("/saml2/idp/sso").header_missing("authorization");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html>SAMLRequest</html>");
        });

        let abap = MockServer::start();
        let sso_url = format!("{}/saml2/idp/sso", idp.base_url());
        let _redirect = abap.mock(|when, then| {
            when.method(GET).path("/sap/opu/odata/");
            then.status(302).header("location", &sso_url);
        });

        let client = test_client();
        let resp = client
            .get(&format!("{}/sap/opu/odata/", abap.base_url()))
            .header("authorization", "Basic dXNlcjpwYXNz")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), http::StatusCode::OK);
        assert!(resp.text().await.unwrap().contains("SAMLRequest"));
        login_page.assert();
    }

    #[tokio::test]
    async fn test_interceptors_run_in_attach_order() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/order").header("x-trace", "outer,inner");
            then.status(200);
        });

        fn tag(name: &'static str) -> impl FnOnce(HttpService) -> HttpService + Send {
            move |inner: HttpService| {
                HttpService::new(tower::service_fn(move |mut req: Request<Full<Bytes>>| {
                    let trace = match req.headers().get("x-trace") {
                        Some(prev) => format!("{},{name}", prev.to_str().unwrap()),
                        None => name.to_owned(),
                    };
                    req.headers_mut()
                        .insert("x-trace", trace.parse().unwrap());
                    inner.clone().oneshot(req)
                }))
            }
        }

        let client = HttpClientBuilder::new()
            .allow_insecure_http()
            .interceptor(tag("outer"))
            .interceptor(tag("inner"))
            .build()
            .unwrap();

        client
            .get(&format!("{}/order", server.base_url()))
            .send()
            .await
            .unwrap();
        m.assert();
    }

    #[tokio::test]
    async fn test_interceptor_error_surfaces_unchanged() {
        #[derive(Debug)]
        struct Rejected;
        impl std::fmt::Display for Rejected {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("rejected")
            }
        }
        impl std::error::Error for Rejected {}

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let client = HttpClientBuilder::new()
            .allow_insecure_http()
            .interceptor(move |_inner| {
                HttpService::new(tower::service_fn(move |_req: Request<Full<Bytes>>| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    async { Err::<Response<ResponseBody>, _>(HttpError::intercepted(Rejected)) }
                }))
            })
            .build()
            .unwrap();

        let err = client.get("http://127.0.0.1:9/never").send().await.unwrap_err();
        assert!(matches!(err, HttpError::Intercepted(ref e) if e.is::<Rejected>()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_http_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpClient>();
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/concurrent");
            then.status(200).body("ok");
        });

        let client = test_client();
        let url = format!("{}/concurrent", server.base_url());

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let client = client.clone();
                let url = url.clone();
                tokio::spawn(async move { client.get(&url).send().await?.text().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "ok");
        }
    }
}
