use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;

use super::{AnnotationFilter, Annotations, CatalogService, ODataServiceInfo, ServiceFilter};
use crate::error::AbapError;
use crate::odata::{ODataService, ODataVersion, RequestOptions};
use crate::provider::AbapService;

const RECOMMENDED_SET: &str = "RecommendedServices";
const CLASSIC_SET: &str = "Services";
const GROUPS: &str = "/ServiceGroups";

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEntry {
    service_id: String,
    #[serde(default)]
    service_version: Value,
    service_url: String,
}

/// `/iwfnd/config/default/iwfnd/catalog/0002`.
#[derive(Debug)]
pub struct V4CatalogService {
    odata: Arc<ODataService>,
    entity_set: OnceCell<&'static str>,
}

impl AbapService for V4CatalogService {
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

impl V4CatalogService {
    pub const PATH: &'static str = "/sap/opu/odata4/iwfnd/config/default/iwfnd/catalog/0002";

    /// `RecommendedServices` if `$metadata` declares it, `Services` otherwise.
    async fn entity_set(&self) -> Result<&'static str, AbapError> {
        self.entity_set
            .get_or_try_init(|| async {
                let metadata = self.odata.metadata().await?;
                let set = if metadata.contains(&format!("Name=\"{RECOMMENDED_SET}\"")) {
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

    /// Resource and query of a `@odata.nextLink`, which may be absolute or
    /// relative to the service root.
    fn next_request(&self, link: &str) -> Result<(String, Vec<(String, String)>), AbapError> {
        let base = self.odata.url("/", &[]);
        let next = base
            .join(link)
            .map_err(|e| AbapError::InvalidArgument(format!("invalid next link '{link}': {e}")))?;
        let resource = next
            .path()
            .strip_prefix(self.odata.path())
            .filter(|r| r.starts_with('/'))
            .unwrap_or(GROUPS)
            .to_owned();
        let params = next
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok((resource, params))
    }
}

fn group_services(group: &Value, entity_set: &str) -> Result<Vec<ODataServiceInfo>, AbapError> {
    let group_id = group
        .get("GroupId")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let Some(entries) = group
        .get("DefaultSystem")
        .and_then(|system| system.get(entity_set))
    else {
        return Ok(Vec::new());
    };
    let entries: Vec<ServiceEntry> = serde_json::from_value(entries.clone())?;

    Ok(entries
        .into_iter()
        .map(|entry| ODataServiceInfo {
            id: entry.service_id.clone(),
            name: entry.service_id,
            group: group_id.clone(),
            path: entry.service_url,
            service_version: match entry.service_version {
                Value::String(v) => v,
                Value::Null => String::new(),
                other => other.to_string(),
            },
            odata_version: ODataVersion::V4,
        })
        .collect())
}

#[async_trait]
impl CatalogService for V4CatalogService {
    async fn list_services(&self) -> Result<Vec<ODataServiceInfo>, AbapError> {
        let entity_set = self.entity_set().await?;
        let mut resource = GROUPS.to_owned();
        let mut params = vec![(
            "$expand".to_owned(),
            format!("DefaultSystem($expand={entity_set})"),
        )];
        let mut seen = HashSet::new();
        let mut services = Vec::new();

        loop {
            let mut options = RequestOptions::new();
            for (name, value) in params {
                options = options.param(name, value);
            }
            let response = self.odata.get(&resource, options).await?;

            let groups = response.odata()?;
            for group in groups.as_array().into_iter().flatten() {
                services.extend(group_services(group, entity_set)?);
            }

            let page: Page = response.json()?;
            let Some(link) = page.next_link else {
                break;
            };
            if !seen.insert(link.clone()) {
                tracing::warn!(next_link = %link, "catalog repeated a page link, stopping");
                break;
            }
            tracing::debug!(next_link = %link, "following catalog page link");
            (resource, params) = self.next_request(&link)?;
        }

        tracing::debug!(count = services.len(), "listed v4 services");
        Ok(services)
    }

    async fn find_service(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Option<ODataServiceInfo>, AbapError> {
        let title = filter.title().ok_or_else(|| {
            AbapError::InvalidArgument("a service title or path is required".to_owned())
        })?;
        let services = self.list_services().await?;
        let found = services.into_iter().find(|s| match filter.path.as_deref() {
            Some(path) => s.path.trim_end_matches('/') == path.trim_end_matches('/'),
            None => s.name.eq_ignore_ascii_case(&title),
        });
        Ok(found)
    }

    /// Annotations of v4 services are part of their `$metadata`.
    async fn get_annotations(
        &self,
        _filter: &AnnotationFilter,
    ) -> Result<Vec<Annotations>, AbapError> {
        Ok(Vec::new())
    }
}
