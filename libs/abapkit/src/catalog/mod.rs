//! Gateway service catalogs: which OData services a system exposes.

mod v2;
mod v4;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AbapError;
use crate::odata::ODataVersion;

pub use v2::V2CatalogService;
pub use v4::V4CatalogService;

/// One service listed by a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ODataServiceInfo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Path of the service root, e.g. `/sap/opu/odata/sap/ZSRV_SRV`.
    pub path: String,
    pub service_version: String,
    pub odata_version: ODataVersion,
}

/// Selects a service by title or path; with only a path the title is its
/// last segment, uppercased.
#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    pub title: Option<String>,
    pub path: Option<String>,
}

impl ServiceFilter {
    #[must_use]
    pub fn by_path(path: impl Into<String>) -> Self {
        Self {
            title: None,
            path: Some(path.into()),
        }
    }

    #[must_use]
    pub fn by_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            path: None,
        }
    }

    /// Explicit title, or the last non-empty segment of the path uppercased.
    #[must_use]
    pub fn title(&self) -> Option<String> {
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            return Some(title.to_owned());
        }
        self.path
            .as_deref()?
            .split('/')
            .rev()
            .find(|segment| !segment.is_empty())
            .map(str::to_uppercase)
    }
}

/// Selects the service whose annotations are wanted.
#[derive(Debug, Clone, Default)]
pub struct AnnotationFilter {
    pub id: Option<String>,
    pub title: Option<String>,
    pub path: Option<String>,
}

/// Annotation document of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotations {
    pub technical_name: String,
    pub version: String,
    /// Annotation XML.
    pub definitions: String,
    pub uri: String,
}

/// A catalog of the services a system exposes.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Every service the catalog lists. An empty list is a valid answer.
    ///
    /// # Errors
    ///
    /// Returns `AbapError` for transport failures, error statuses and error
    /// payloads on any page.
    async fn list_services(&self) -> Result<Vec<ODataServiceInfo>, AbapError>;

    /// The service matching `filter`, if any.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::InvalidArgument` when `filter` names neither a
    /// title nor a path, otherwise as [`list_services`](Self::list_services).
    async fn find_service(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Option<ODataServiceInfo>, AbapError>;

    /// Annotation documents of the service matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::InvalidArgument` when `filter` is empty, otherwise
    /// as [`list_services`](Self::list_services).
    async fn get_annotations(
        &self,
        filter: &AnnotationFilter,
    ) -> Result<Vec<Annotations>, AbapError>;
}

/// Quote `value` as an OData string literal.
pub(crate) fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
