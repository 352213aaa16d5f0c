mod common;

use abapkit::catalog::{AnnotationFilter, ServiceFilter, V2CatalogService, V4CatalogService};
use abapkit::{AbapError, ODataVersion};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{query, requests_to};

fn v2(resource: &str) -> String {
    format!("{}{resource}", V2CatalogService::PATH)
}

fn v4(resource: &str) -> String {
    format!("{}{resource}", V4CatalogService::PATH)
}

fn v2_entry(id: &str, name: &str, url: &str) -> Value {
    json!({
        "ID": id,
        "Title": name,
        "TechnicalServiceName": name,
        "TechnicalServiceVersion": 1,
        "ServiceUrl": url,
    })
}

async fn mount_document(server: &MockServer, sets: &[&str]) {
    Mock::given(method("GET"))
        .and(path(v2("/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"d": {"EntitySets": sets}})))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn v2_prefers_recommended_collection() {
    let server = MockServer::start().await;
    mount_document(&server, &["ServiceCollection", "RecommendedServiceCollection"]).await;
    Mock::given(method("GET"))
        .and(path(v2("/RecommendedServiceCollection")))
        .and(query_param("$format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"d": {"results": [
            v2_entry("ZSRV_A_0001", "ZSRV_A", "https://s4.example.com/sap/opu/odata/sap/ZSRV_A"),
            v2_entry("ZSRV_B_0001", "ZSRV_B", "https://s4.example.com/sap/opu/odata/sap/ZSRV_B"),
        ]}})))
        .expect(2)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let catalog = provider.catalog(ODataVersion::V2).unwrap();
    let services = catalog.list_services().await.unwrap();
    assert_eq!(services.len(), 2);
    assert_eq!(services[1].path, "/sap/opu/odata/sap/ZSRV_B");
    assert_eq!(services[1].name, "ZSRV_B");

    // the entity set is resolved only once
    catalog.list_services().await.unwrap();
}

#[tokio::test]
async fn v2_classic_collection_is_filtered_on_s4_cloud() {
    let server = MockServer::start().await;
    mount_document(&server, &["ServiceCollection"]).await;
    Mock::given(method("GET"))
        .and(path("/sap/bc/adt/ato/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<atom:settings xmlns:atom="http://www.sap.com/adt/ato" atom:developmentPrefix="YY1_" atom:operationsType="C" atom:tenantType="CUSTOMER"/>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(v2("/ServiceCollection")))
        .and(query_param("$filter", "IsSapService eq false or ReleaseStatus eq 'RELEASED'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"d": {"results": []}})))
        .expect(2)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let catalog = provider.catalog(ODataVersion::V2).unwrap();
    assert!(catalog.list_services().await.unwrap().is_empty());
    assert!(catalog.list_services().await.unwrap().is_empty());
    assert!(provider.is_s4_cloud().await);
}

#[tokio::test]
async fn v2_classic_collection_unfiltered_on_premise() {
    let server = MockServer::start().await;
    mount_document(&server, &["ServiceCollection"]).await;
    Mock::given(method("GET"))
        .and(path("/sap/bc/adt/ato/settings"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(v2("/ServiceCollection")))
        .and(query_param_is_missing("$filter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"d": {"results": [
            v2_entry("ZSRV_0001", "ZSRV", "/sap/opu/odata/sap/ZSRV"),
        ]}})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let services = provider
        .catalog(ODataVersion::V2)
        .unwrap()
        .list_services()
        .await
        .unwrap();
    assert_eq!(services.len(), 1);
}

#[tokio::test]
async fn v2_error_payload_is_a_failure() {
    let server = MockServer::start().await;
    mount_document(&server, &["RecommendedServiceCollection"]).await;
    Mock::given(method("GET"))
        .and(path(v2("/RecommendedServiceCollection")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": "/IWFND/MED/170", "message": {"lang": "en", "value": "No service found"}}
        })))
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let err = provider
        .catalog(ODataVersion::V2)
        .unwrap()
        .list_services()
        .await
        .unwrap_err();
    match err {
        AbapError::OData(e) => assert_eq!(e.code.as_deref(), Some("/IWFND/MED/170")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn v2_find_service_prefers_matching_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(v2("/ServiceCollection")))
        .and(query_param("$filter", "Title eq 'ZTRAVEL_SRV'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"d": {"results": [
            v2_entry("ZTRAVEL_SRV_0001", "ZTRAVEL_SRV", "https://s4.example.com/sap/opu/odata/sap/ZTRAVEL_SRV"),
            v2_entry("ZTRAVEL_SRV_0002", "ZTRAVEL_SRV", "https://s4.example.com/sap/opu/odata/ns/ZTRAVEL_SRV"),
        ]}})))
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let catalog = provider.catalog(ODataVersion::V2).unwrap();

    let found = catalog
        .find_service(&ServiceFilter::by_path("/sap/opu/odata/ns/ztravel_srv"))
        .await
        .unwrap();
    let found = found.unwrap();
    assert_eq!(found.id, "ZTRAVEL_SRV_0001", "case differs, first match wins");

    let found = catalog
        .find_service(&ServiceFilter::by_path("/sap/opu/odata/ns/ZTRAVEL_SRV"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, "ZTRAVEL_SRV_0002");

    let err = catalog.find_service(&ServiceFilter::default()).await.unwrap_err();
    assert!(matches!(err, AbapError::InvalidArgument(_)));
}

#[tokio::test]
async fn v2_find_service_without_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(v2("/ServiceCollection")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"d": {"results": []}})))
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let found = provider
        .catalog(ODataVersion::V2)
        .unwrap()
        .find_service(&ServiceFilter::by_title("ZNONE"))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn v2_annotations_skip_empty_definitions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(v2("/ServiceCollection('ZSRV_0001')/Annotations")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"d": {"results": [
            {"TechnicalName": "ZANNO", "Version": "0001"},
            {"TechnicalName": "ZEMPTY", "Version": "0001"},
        ]}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(v2("/Annotations(TechnicalName='ZANNO',Version='0001')/$value/")))
        .and(query_param_is_missing("$format"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<edmx:Edmx Version=\"4.0\"/>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(v2("/Annotations(TechnicalName='ZEMPTY',Version='0001')/$value/")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let catalog = provider.catalog(ODataVersion::V2).unwrap();
    let annotations = catalog
        .get_annotations(&AnnotationFilter {
            id: Some("ZSRV_0001".into()),
            ..AnnotationFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].technical_name, "ZANNO");
    assert!(annotations[0].definitions.contains("Edmx"));

    let err = catalog
        .get_annotations(&AnnotationFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AbapError::InvalidArgument(_)));
}

fn v4_page(page: usize, next: bool) -> Value {
    let services: Vec<Value> = (0..5)
        .map(|i| {
            let n = page * 5 + i;
            json!({
                "ServiceId": format!("ZUI_SRV_{n:02}"),
                "ServiceVersion": "0001",
                "ServiceUrl": format!("/sap/opu/odata4/sap/zui_srv_{n:02}/srvd/sap/zui_srv_{n:02}/0001/"),
            })
        })
        .collect();
    let mut body = json!({
        "@odata.context": "$metadata#ServiceGroups",
        "value": [{"GroupId": format!("ZGROUP_{page}"), "DefaultSystem": {"RecommendedServices": services}}],
    });
    if next {
        body["@odata.nextLink"] = json!(format!(
            "ServiceGroups?$expand=DefaultSystem($expand=RecommendedServices)&$skiptoken={}",
            (page + 1) * 5
        ));
    }
    body
}

#[tokio::test]
async fn v4_follows_every_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(v4("/$metadata")))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<edmx:Edmx><EntityContainer Name="Container"><EntitySet Name="RecommendedServices" EntityType="x.Service"/></EntityContainer></edmx:Edmx>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(v4("/ServiceGroups")))
        .and(query_param("$expand", "DefaultSystem($expand=RecommendedServices)"))
        .and(query_param_is_missing("$skiptoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(v4_page(0, true)))
        .expect(1)
        .mount(&server)
        .await;
    for page in 1..4 {
        Mock::given(method("GET"))
            .and(path(v4("/ServiceGroups")))
            .and(query_param("$skiptoken", (page * 5).to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(v4_page(page, page < 3)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let provider = common::provider(&server);
    let services = provider
        .catalog(ODataVersion::V4)
        .unwrap()
        .list_services()
        .await
        .unwrap();

    assert_eq!(services.len(), 20);
    let ids: Vec<_> = services.iter().map(|s| s.id.clone()).collect();
    let expected: Vec<_> = (0..20).map(|n| format!("ZUI_SRV_{n:02}")).collect();
    assert_eq!(ids, expected);
    assert_eq!(services[19].group.as_deref(), Some("ZGROUP_3"));
    assert_eq!(services[0].odata_version, ODataVersion::V4);

    let pages = requests_to(&server, "/ServiceGroups").await;
    assert_eq!(pages.len(), 4);
    assert!(pages.iter().all(|r| query(r, "sap-client").as_deref() == Some(common::CLIENT)));
}

#[tokio::test]
async fn v4_falls_back_to_services_and_has_no_annotations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(v4("/$metadata")))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<edmx:Edmx><EntitySet Name="Services" EntityType="x.Service"/></edmx:Edmx>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(v4("/ServiceGroups")))
        .and(query_param("$expand", "DefaultSystem($expand=Services)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@odata.context": "$metadata#ServiceGroups",
            "value": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::provider(&server);
    let catalog = provider.catalog(ODataVersion::V4).unwrap();
    assert!(catalog.list_services().await.unwrap().is_empty());
    assert!(
        catalog
            .get_annotations(&AnnotationFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
}
