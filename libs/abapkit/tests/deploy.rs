mod common;

use abapkit::AbapError;
use abapkit::deploy::{
    LayeredRepositoryService, LrepDeployConfig, LrepUndeployConfig, Namespace, DeployRequest,
    Ui5AbapRepositoryService, UndeployRequest,
};
use bytes::Bytes;
use http::StatusCode;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{query, requests_to};

const APP: &str = "ZAPP";

fn repository(resource: &str) -> String {
    format!("{}{resource}", Ui5AbapRepositoryService::PATH)
}

fn lrep(resource: &str) -> String {
    format!("{}{resource}", LayeredRepositoryService::PATH)
}

fn app_info() -> serde_json::Value {
    json!({"d": {"Name": APP, "Package": "ZPKG", "Description": "Travel app", "Info": ""}})
}

fn archive() -> Bytes {
    Bytes::from_static(b"PK\x03\x04 fake zip")
}

#[tokio::test]
async fn timed_out_deployment_is_retried_as_update() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(repository("/Repositories('ZAPP')")))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(repository("/Repositories('ZAPP')")))
        .respond_with(ResponseTemplate::new(200).set_body_json(app_info()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(repository("/Repositories")))
        .and(header("content-type", "application/atom+xml; type=entry; charset=UTF-8"))
        .and(body_string_contains("<d:Package>ZPKG</d:Package>"))
        .respond_with(ResponseTemplate::new(504))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(repository("/Repositories('ZAPP')")))
        .and(query_param("CodePage", "'UTF8'"))
        .and(query_param("CondenseMessagesInHttpResponseHeader", "X"))
        .and(query_param("TransportRequest", "K900001"))
        .and(query_param_is_missing("TestMode"))
        .respond_with(
            ResponseTemplate::new(204).insert_header(
                "sap-message",
                r#"{"code":"/UI5/UI5_REP_LOAD/042","message":"Upload finished","severity":"success","details":[]}"#,
            ),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let service = provider.ui5_abap_repository().unwrap();
    let mut request = DeployRequest::new(APP, "zpkg", archive());
    request.transport = Some("K900001".into());

    let outcome = service.deploy(&request).await.unwrap();
    assert_eq!(outcome.status, StatusCode::NO_CONTENT);
    assert!(!outcome.simulated);
    assert_eq!(
        outcome.message.map(|m| m.message),
        Some("Upload finished".to_owned())
    );
}

#[tokio::test]
async fn deployment_gives_up_after_three_timeouts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(repository("/Repositories('ZAPP')")))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(repository("/Repositories")))
        .respond_with(ResponseTemplate::new(504))
        .expect(3)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let err = provider
        .ui5_abap_repository()
        .unwrap()
        .deploy(&DeployRequest::new(APP, "ZPKG", archive()))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::GATEWAY_TIMEOUT));
}

#[tokio::test]
async fn test_mode_rejection_is_a_simulation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(repository("/Repositories('ZAPP')")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(repository("/Repositories")))
        .and(query_param("TestMode", "true"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": "/UI5/UI5_REP_LOAD/033",
                "message": {"lang": "en", "value": "Test mode: application would be created"},
                "innererror": {"errordetails": []}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let mut request = DeployRequest::new(APP, "ZPKG", archive());
    request.test_mode = true;
    let outcome = provider
        .ui5_abap_repository()
        .unwrap()
        .deploy(&request)
        .await
        .unwrap();

    assert!(outcome.simulated);
    assert_eq!(outcome.status, StatusCode::FORBIDDEN);
    assert_eq!(
        outcome.message.map(|m| m.code),
        Some("/UI5/UI5_REP_LOAD/033".to_owned())
    );
}

#[tokio::test]
async fn undeploy_of_missing_app_is_a_no_op() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(repository("/Repositories('ZAPP')")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let outcome = provider
        .ui5_abap_repository()
        .unwrap()
        .undeploy(&UndeployRequest {
            name: APP.into(),
            ..UndeployRequest::default()
        })
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn undeploy_retries_bad_request_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(repository("/Repositories('ZAPP')")))
        .respond_with(ResponseTemplate::new(200).set_body_json(app_info()))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(repository("/Repositories('ZAPP')")))
        .respond_with(ResponseTemplate::new(400))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(repository("/Repositories('ZAPP')")))
        .and(query_param("TransportRequest", "K900002"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let outcome = provider
        .ui5_abap_repository()
        .unwrap()
        .undeploy(&UndeployRequest {
            name: APP.into(),
            transport: Some("K900002".into()),
            test_mode: false,
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn undeploy_fails_after_second_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(repository("/Repositories('ZAPP')")))
        .respond_with(ResponseTemplate::new(200).set_body_json(app_info()))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(400).set_body_string("locked"))
        .expect(2)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let err = provider
        .ui5_abap_repository()
        .unwrap()
        .undeploy(&UndeployRequest {
            name: APP.into(),
            ..UndeployRequest::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(err.body_preview(), Some("locked"));
}

#[tokio::test]
async fn download_decodes_archive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(repository("/Repositories('ZAPP')")))
        .and(query_param("DownloadFiles", "RUNTIME"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "d": {"Name": APP, "ZipArchive": "UEsDBA=="}
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(repository("/Repositories('ZAPP')")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "d": {"Name": APP, "Package": "ZPKG"}
        })))
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let service = provider.ui5_abap_repository().unwrap();
    let files = service.download_files(APP).await.unwrap().unwrap();
    assert_eq!(&files[..], b"PK\x03\x04");

    let info = service.get_info(APP).await.unwrap().found().unwrap();
    assert_eq!(info.package, "ZPKG");
}

fn variant() -> Namespace {
    Namespace::Variant {
        reference: "my.app".into(),
        id: "customer.my.app.variant".into(),
    }
}

#[tokio::test]
async fn lrep_deploy_to_local_package() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(lrep("/actions/getcsrftoken/")))
        .and(header("x-csrf-token", "Fetch"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-csrf-token", "lrep-token"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(lrep("/dta_folder/")))
        .and(query_param("name", "apps/my.app/appVariants/customer.my.app.variant/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(lrep("/dta_folder/")))
        .and(header("x-csrf-token", "lrep-token"))
        .and(header("content-type", "application/octet-stream"))
        .and(query_param("layer", "CUSTOMER_BASE"))
        .and(query_param("package", "$TMP"))
        .and(query_param_is_missing("changelist"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": "Variant created",
            "messages": [{"severity": "Info", "text": "stored"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let response = provider
        .layered_repository()
        .unwrap()
        .deploy(
            archive(),
            &LrepDeployConfig {
                namespace: variant(),
                layer: None,
                package: None,
                transport: Some("K900003".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn lrep_update_carries_changelist() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(lrep("/actions/getcsrftoken/")))
        .respond_with(ResponseTemplate::new(200).insert_header("x-csrf-token", "lrep-token"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(lrep("/dta_folder/")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(lrep("/dta_folder/")))
        .and(query_param("package", "ZPKG"))
        .and(query_param("changelist", "K900003"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    provider
        .layered_repository()
        .unwrap()
        .deploy(
            archive(),
            &LrepDeployConfig {
                namespace: variant(),
                layer: None,
                package: Some("ZPKG".into()),
                transport: Some("K900003".into()),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn lrep_undeploy_of_missing_variant_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(lrep("/dta_folder/")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let err = provider
        .layered_repository()
        .unwrap()
        .undeploy(&LrepUndeployConfig {
            namespace: variant(),
            layer: None,
            transport: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AbapError::NotFound(_)));
}

#[tokio::test]
async fn lrep_undeploy_existing_variant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(lrep("/dta_folder/")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(lrep("/dta_folder/")))
        .and(query_param("namespace", "apps/my.app/appVariants/customer.my.app.variant/"))
        .and(query_param("changelist", "K900004"))
        .respond_with(ResponseTemplate::new(200).set_body_string("deleted"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let response = provider
        .layered_repository()
        .unwrap()
        .undeploy(&LrepUndeployConfig {
            namespace: variant(),
            layer: Some("CUSTOMER_BASE".into()),
            transport: Some("K900004".into()),
        })
        .await
        .unwrap();
    assert_eq!(response.text(), "deleted");

    let lookups = requests_to(&server, "/dta_folder/").await;
    assert!(query(&lookups[0], "timestamp").is_some());
}

#[tokio::test]
async fn merged_descriptor_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(lrep("/appdescr_variant_preview/")))
        .and(query_param("sap-language", "EN"))
        .and(header("content-type", "application/zip"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "manifest.json": {"sap.app": {"id": "customer.my.app.variant"}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let merged = provider
        .layered_repository()
        .unwrap()
        .merge_app_descriptor_variant(archive())
        .await
        .unwrap();
    assert_eq!(
        merged["manifest.json"]["sap.app"]["id"],
        "customer.my.app.variant"
    );
}
