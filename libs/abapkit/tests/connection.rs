mod common;

use std::sync::Arc;

use abapkit::{AbapError, AbapServiceProvider, ProviderConfig};
use http::StatusCode;
use serde_json::json;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use common::{header, query, requests_to};

const APP_INDEX: &str = "/sap/bc/ui2/app_index/";

async fn mount_app_index(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(APP_INDEX))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-csrf-token", "tok123")
                .append_header("set-cookie", "SAP_SESSIONID_S4H_100=abc%3d; path=/; HttpOnly")
                .append_header("set-cookie", "sap-usercontext=sap-client=100; path=/")
                .set_body_json(json!({"results": []})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn csrf_fetched_once_then_echoed() {
    let server = MockServer::start().await;
    mount_app_index(&server).await;
    let provider = common::provider(&server);
    let index = provider.app_index().unwrap();

    for _ in 0..5 {
        assert!(index.search(&[], &[]).await.unwrap().is_empty());
    }

    let requests = requests_to(&server, APP_INDEX).await;
    assert_eq!(requests.len(), 5);
    assert_eq!(header(&requests[0], "x-csrf-token"), Some("Fetch"));
    for request in &requests[1..] {
        assert_eq!(header(request, "x-csrf-token"), Some("tok123"));
    }
}

#[tokio::test]
async fn concurrent_first_requests_fetch_once() {
    let server = MockServer::start().await;
    mount_app_index(&server).await;
    let provider = Arc::new(common::provider(&server));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.app_index().unwrap().search(&[], &[]).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let fetches = requests_to(&server, APP_INDEX)
        .await
        .iter()
        .filter(|r| header(r, "x-csrf-token") == Some("Fetch"))
        .count();
    assert_eq!(fetches, 1);
}

#[tokio::test]
async fn cookies_round_trip() {
    let server = MockServer::start().await;
    mount_app_index(&server).await;
    let provider = common::provider(&server);
    let index = provider.app_index().unwrap();

    index.search(&[], &[]).await.unwrap();
    index.search(&[], &[]).await.unwrap();

    let requests = requests_to(&server, APP_INDEX).await;
    assert_eq!(header(&requests[0], "cookie"), None);
    let cookie = header(&requests[1], "cookie").unwrap();
    assert!(cookie.contains("SAP_SESSIONID_S4H_100=abc%3d"));
    assert!(cookie.contains("sap-usercontext=sap-client=100"));
}

#[tokio::test]
async fn expired_cookie_is_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_INDEX))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "a=1; path=/")
                .append_header("set-cookie", "b=2; path=/")
                .set_body_json(json!({"results": []})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(APP_INDEX))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "a=deleted; Max-Age=0; path=/")
                .set_body_json(json!({"results": []})),
        )
        .mount(&server)
        .await;
    let provider = common::provider(&server);
    let index = provider.app_index().unwrap();

    for _ in 0..3 {
        index.search(&[], &[]).await.unwrap();
    }

    let requests = requests_to(&server, APP_INDEX).await;
    assert_eq!(header(&requests[1], "cookie"), Some("a=1; b=2"));
    assert_eq!(header(&requests[2], "cookie"), Some("b=2"));
}

#[tokio::test]
async fn saml_login_page_falls_back_to_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_INDEX))
        .and(query_param_is_missing("saml2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                "<html><body onload=\"document.forms[0].submit()\"><form method=\"post\"><input name=\"SAMLRequest\"/></form></body></html>",
                "text/html; charset=utf-8",
            ),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(APP_INDEX))
        .and(query_param("saml2", "disabled"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-csrf-token", "tok")
                .set_body_json(json!({"results": [{"sap.app/id": "my.app"}]})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let config = common::config(&server).with_basic_auth("DEVELOPER", "secret");
    let provider = AbapServiceProvider::create_for_abap(&config).unwrap();
    let index = provider.app_index().unwrap();

    let results = index.search(&[], &[]).await.unwrap();
    assert_eq!(results.len(), 1);
    index.search(&[], &[]).await.unwrap();

    let requests = requests_to(&server, APP_INDEX).await;
    assert_eq!(requests.len(), 3);
    assert!(header(&requests[1], "authorization").is_some_and(|v| v.starts_with("Basic ")));
    assert_eq!(query(&requests[2], "saml2").as_deref(), Some("disabled"));
    assert_eq!(
        header(&requests[2], "authorization"),
        None,
        "credentials are dropped after the first success"
    );
}

#[tokio::test]
async fn logon_required_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_INDEX))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("sap-err-id", "ICFLOGONREQUIRED")
                .set_body_json(json!({})),
        )
        .mount(&server)
        .await;
    let provider = common::provider(&server);

    let err = provider.app_index().unwrap().search(&[], &[]).await.unwrap_err();
    assert!(matches!(err, AbapError::Connection(_)), "{err:?}");
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn login_form_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_INDEX))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                "<html><title>Logon</title><form>User</form></html>",
                "text/html",
            ),
        )
        .mount(&server)
        .await;
    let provider = common::provider(&server);

    let err = provider.app_index().unwrap().search(&[], &[]).await.unwrap_err();
    assert!(matches!(err, AbapError::Connection(_)), "{err:?}");
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn first_error_status_is_a_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_INDEX))
        .respond_with(ResponseTemplate::new(403).set_body_string("no authorization for S_SERVICE"))
        .mount(&server)
        .await;
    let provider = common::provider(&server);

    let err = provider.app_index().unwrap().search(&[], &[]).await.unwrap_err();
    assert!(matches!(err, AbapError::Connection(_)));
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    assert_eq!(err.body_preview(), Some("no authorization for S_SERVICE"));
}

#[tokio::test]
async fn default_params_and_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_INDEX))
        .and(query_param("sap-client", "100"))
        .and(query_param("fields", "sap.app/id,sap.app/title"))
        .and(|req: &Request| header(req, "x-custom") == Some("1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;
    let config: ProviderConfig = common::config(&server).with_header("x-custom", "1");
    let provider = AbapServiceProvider::create_for_abap(&config).unwrap();

    provider
        .app_index()
        .unwrap()
        .search(&[], &["sap.app/id", "sap.app/title"])
        .await
        .unwrap();
}
