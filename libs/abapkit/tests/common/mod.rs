#![allow(dead_code)]

use abapkit::{AbapServiceProvider, ProviderConfig};
use wiremock::{MockServer, Request};

pub const CLIENT: &str = "100";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("abapkit=debug")
        .with_test_writer()
        .try_init();
}

pub fn config(server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(server.uri()).with_client(CLIENT)
}

pub fn provider(server: &MockServer) -> AbapServiceProvider {
    init_tracing();
    AbapServiceProvider::create_for_abap(&config(server)).unwrap()
}

pub fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

pub fn query(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Requests received so far whose path ends with `suffix`.
pub async fn requests_to(server: &MockServer, suffix: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path().ends_with(suffix))
        .collect()
}
