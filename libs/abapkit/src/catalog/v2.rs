use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;

use super::{AnnotationFilter, Annotations, CatalogService, ODataServiceInfo, ServiceFilter, quote};
use crate::error::AbapError;
use crate::odata::{ODataService, ODataVersion, RequestOptions};
use crate::provider::AbapService;

const RECOMMENDED_SET: &str = "RecommendedServiceCollection";
const CLASSIC_SET: &str = "ServiceCollection";
/// Released SAP services plus every customer service.
const S4_CLOUD_FILTER: &str = "IsSapService eq false or ReleaseStatus eq 'RELEASED'";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogEntry {
    #[serde(rename = "ID")]
    id: String,
    technical_service_name: String,
    #[serde(default)]
    technical_service_version: Value,
    service_url: String,
}

impl CatalogEntry {
    fn into_info(self) -> ODataServiceInfo {
        let path = service_path(&self.service_url);
        let service_version = match self.technical_service_version {
            Value::String(v) => v,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        ODataServiceInfo {
            id: self.id,
            name: self.technical_service_name,
            group: None,
            path,
            service_version,
            odata_version: ODataVersion::V2,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AnnotationEntry {
    technical_name: String,
    version: String,
}

/// Path of an absolute or relative service URL, without a query.
fn service_path(service_url: &str) -> String {
    match url::Url::parse(service_url) {
        Ok(url) => url.path().to_owned(),
        Err(_) => service_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_owned(),
    }
}

/// `/IWFND/CATALOGSERVICE;v=2`.
#[derive(Debug)]
pub struct V2CatalogService {
    odata: Arc<ODataService>,
    entity_set: OnceCell<&'static str>,
}

impl AbapService for V2CatalogService {
    fn from_odata(odata: Arc<ODataService>) -> Self {
        Self {
            odata,
            entity_set: OnceCell::new(),
        }
    }

    fn odata(&self) -> &Arc<ODataService> {
        &self.odata
    }
}

impl V2CatalogService {
    pub const PATH: &'static str = "/sap/opu/odata/IWFND/CATALOGSERVICE;v=2";

    /// `RecommendedServiceCollection` where the system offers it,
    /// `ServiceCollection` otherwise. Resolved once.
    async fn entity_set(&self) -> Result<&'static str, AbapError> {
        self.entity_set
            .get_or_try_init(|| async {
                let document = self.odata.document().await?;
                let set = if document.contains(RECOMMENDED_SET) {
                    RECOMMENDED_SET
                } else {
                    CLASSIC_SET
                };
                tracing::debug!(entity_set = set, "resolved catalog entity set");
                Ok(set)
            })
            .await
            .copied()
    }

    async fn fetch(&self, entity_set: &str, options: RequestOptions) -> Result<Vec<ODataServiceInfo>, AbapError> {
        let entries: Vec<CatalogEntry> = self
            .odata
            .get(&format!("/{entity_set}"), options)
            .await?
            .odata_as()?;
        Ok(entries.into_iter().map(CatalogEntry::into_info).collect())
    }
}

#[async_trait]
impl CatalogService for V2CatalogService {
    async fn list_services(&self) -> Result<Vec<ODataServiceInfo>, AbapError> {
        let entity_set = self.entity_set().await?;
        let mut options = RequestOptions::new();
        if entity_set == CLASSIC_SET && self.odata.connection().is_s4_cloud().await {
            options = options.param("$filter", S4_CLOUD_FILTER);
        }
        let services = self.fetch(entity_set, options).await?;
        tracing::debug!(count = services.len(), "listed v2 services");
        Ok(services)
    }

    async fn find_service(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Option<ODataServiceInfo>, AbapError> {
        let title = filter.title().ok_or_else(|| {
            AbapError::InvalidArgument("a service title or path is required".to_owned())
        })?;
        let mut services = self
            .fetch(
                CLASSIC_SET,
                RequestOptions::new().param("$filter", format!("Title eq {}", quote(&title))),
            )
            .await?;

        if services.len() > 1
            && let Some(path) = filter.path.as_deref()
        {
            let encoded = urlencoding::encode(path);
            let preferred: Vec<_> = services
                .iter()
                .filter(|s| s.path.contains(path) || s.path.contains(encoded.as_ref()))
                .cloned()
                .collect();
            if !preferred.is_empty() {
                services = preferred;
            }
        }
        if services.len() > 1 {
            tracing::warn!(
                title = %title,
                count = services.len(),
                "several services match, using the first"
            );
        }
        Ok(services.into_iter().next())
    }

    async fn get_annotations(
        &self,
        filter: &AnnotationFilter,
    ) -> Result<Vec<Annotations>, AbapError> {
        let id = match filter.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_owned(),
            None => {
                if filter.title.is_none() && filter.path.is_none() {
                    return Err(AbapError::InvalidArgument(
                        "a service id, title or path is required".to_owned(),
                    ));
                }
                let service = self
                    .find_service(&ServiceFilter {
                        title: filter.title.clone(),
                        path: filter.path.clone(),
                    })
                    .await?;
                match service {
                    Some(service) => service.id,
                    None => {
                        tracing::warn!(?filter, "no service found for annotations");
                        return Ok(Vec::new());
                    }
                }
            }
        };

        let entries: Vec<AnnotationEntry> = self
            .odata
            .get(&format!("/{CLASSIC_SET}({})/Annotations", quote(&id)), RequestOptions::new())
            .await?
            .odata_as()?;

        let mut annotations = Vec::with_capacity(entries.len());
        for entry in entries {
            let resource = format!(
                "/Annotations(TechnicalName={},Version={})/$value/",
                quote(&entry.technical_name),
                quote(&entry.version)
            );
            let definitions = self
                .odata
                .get(
                    &resource,
                    RequestOptions::new()
                        .header("accept", "application/xml")
                        .raw(),
                )
                .await?
                .text();
            if definitions.trim().is_empty() {
                tracing::warn!(
                    technical_name = %entry.technical_name,
                    version = %entry.version,
                    "annotation has no definitions, skipping"
                );
                continue;
            }
            annotations.push(Annotations {
                uri: self.odata.url(&resource, &[]).to_string(),
                technical_name: entry.technical_name,
                version: entry.version,
                definitions,
            });
        }
        Ok(annotations)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_mapping() {
        let entry: CatalogEntry = serde_json::from_value(json!({
            "ID": "ZSRV_TRAVEL_0001",
            "Title": "ZSRV_TRAVEL",
            "TechnicalServiceName": "ZSRV_TRAVEL",
            "TechnicalServiceVersion": 1,
            "ServiceUrl": "https://s4.example.com:443/sap/opu/odata/sap/ZSRV_TRAVEL/?sap-client=100"
        }))
        .unwrap();
        let info = entry.into_info();
        assert_eq!(info.id, "ZSRV_TRAVEL_0001");
        assert_eq!(info.path, "/sap/opu/odata/sap/ZSRV_TRAVEL/");
        assert_eq!(info.service_version, "1");
        assert_eq!(info.odata_version, ODataVersion::V2);
    }

    #[test]
    fn relative_service_url() {
        assert_eq!(service_path("/sap/opu/odata/sap/ZX;v=2?x=1"), "/sap/opu/odata/sap/ZX;v=2");
    }
}
