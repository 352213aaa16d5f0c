//! Index of the UI5 applications deployed to a system.

use std::sync::Arc;

use serde_json::Value;

use crate::error::AbapError;
use crate::odata::{ODataService, RequestOptions};
use crate::provider::AbapService;

/// `/sap/bc/ui2/app_index`.
#[derive(Debug)]
pub struct AppIndexService {
    odata: Arc<ODataService>,
}

impl AbapService for AppIndexService {
    fn from_odata(odata: Arc<ODataService>) -> Self {
        Self { odata }
    }

    fn odata(&self) -> &Arc<ODataService> {
        &self.odata
    }
}

impl AppIndexService {
    pub const PATH: &'static str = "/sap/bc/ui2/app_index";

    /// Applications matching `params` (e.g. `sap.app/type=application`),
    /// reduced to `fields` when given.
    ///
    /// # Errors
    ///
    /// Returns `AbapError` if the request fails or the answer has no
    /// `results` list.
    pub async fn search(
        &self,
        params: &[(&str, &str)],
        fields: &[&str],
    ) -> Result<Vec<Value>, AbapError> {
        let mut options = RequestOptions::new().header("accept", "application/json").raw();
        for (name, value) in params {
            options = options.param(*name, *value);
        }
        if !fields.is_empty() {
            options = options.param("fields", fields.join(","));
        }

        let body: Value = self.odata.get("/", options).await?.json()?;
        match body {
            Value::Object(mut map) => match map.remove("results") {
                Some(Value::Array(results)) => Ok(results),
                _ => Err(AbapError::InvalidResponse(
                    "app index answer has no results".to_owned(),
                )),
            },
            _ => Err(AbapError::InvalidResponse(
                "app index answer is not an object".to_owned(),
            )),
        }
    }

    /// Details of the application `app_id`.
    ///
    /// # Errors
    ///
    /// Returns `AbapError` if the request fails or the answer is not JSON.
    pub async fn get_app_info(&self, app_id: &str) -> Result<Value, AbapError> {
        let options = RequestOptions::new()
            .param("id", app_id)
            .header("accept", "application/json")
            .raw();
        self.odata.get("/ui5_app_info_json", options).await?.json()
    }
}
