use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use http::StatusCode;
use quick_xml::escape::escape;
use serde::Deserialize;

use super::messages::{self, SapMessage};
use crate::error::AbapError;
use crate::odata::{ODataResponse, ODataService, RequestOptions};
use crate::provider::{AbapService, Lookup};

const MAX_DEPLOY_ATTEMPTS: u32 = 3;
const MAX_UNDEPLOY_ATTEMPTS: u32 = 2;
const ATOM_ENTRY: &str = "application/atom+xml; type=entry; charset=UTF-8";
const DEFAULT_DESCRIPTION: &str = "Deployed with abapkit";

/// Application stored in the UI5 ABAP repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppInfo {
    pub name: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub info: String,
}

/// A BSP application to create or update.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub name: String,
    pub package: String,
    pub description: Option<String>,
    pub transport: Option<String>,
    /// Archive with the application files.
    pub archive: Bytes,
    /// Let the backend check the upload without storing it.
    pub test_mode: bool,
    /// `false` allows the backend to overwrite files it considers foreign.
    pub safe_mode: bool,
}

impl DeployRequest {
    #[must_use]
    pub fn new(name: impl Into<String>, package: impl Into<String>, archive: Bytes) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            description: None,
            transport: None,
            archive,
            test_mode: false,
            safe_mode: true,
        }
    }
}

/// A BSP application to delete.
#[derive(Debug, Clone, Default)]
pub struct UndeployRequest {
    pub name: String,
    pub transport: Option<String>,
    pub test_mode: bool,
}

/// Result of a deployment or undeployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub status: StatusCode,
    /// Test mode run that the backend answered without storing anything.
    pub simulated: bool,
    pub message: Option<SapMessage>,
}

/// `/UI5/ABAP_REPOSITORY_SRV`: deploys BSP applications.
#[derive(Debug)]
pub struct Ui5AbapRepositoryService {
    odata: Arc<ODataService>,
}

impl AbapService for Ui5AbapRepositoryService {
    fn from_odata(odata: Arc<ODataService>) -> Self {
        Self { odata }
    }

    fn odata(&self) -> &Arc<ODataService> {
        &self.odata
    }
}

fn repository(name: &str) -> String {
    format!("/Repositories('{}')", urlencoding::encode(name))
}

fn is_timeout(err: &AbapError) -> bool {
    matches!(
        err.status(),
        Some(StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT)
    )
}

fn outcome(response: &ODataResponse) -> DeployOutcome {
    let message = response
        .header_str("sap-message")
        .and_then(|header| serde_json::from_str::<SapMessage>(header).ok());
    DeployOutcome {
        status: response.status,
        simulated: false,
        message,
    }
}

fn log_failure(err: &AbapError, action: &str) {
    match err.body_preview() {
        Some(body) => messages::log_error(body, &format!("{action} failed: {err}")),
        None => tracing::error!(error = %err, "{action} failed"),
    }
}

impl Ui5AbapRepositoryService {
    pub const PATH: &'static str = "/sap/opu/odata/UI5/ABAP_REPOSITORY_SRV";

    /// The application called `name`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns `AbapError` for failures other than 404.
    pub async fn get_info(&self, name: &str) -> Result<Lookup<AppInfo>, AbapError> {
        match self.odata.get(&repository(name), RequestOptions::new()).await {
            Ok(response) => Ok(Lookup::Found(response.odata_as()?)),
            Err(err) if err.is_not_found() => Ok(Lookup::NotFound),
            Err(err) => Err(err),
        }
    }

    /// Files of the deployed application `name` as a zip archive.
    ///
    /// # Errors
    ///
    /// Returns `AbapError` for failures other than 404 and
    /// `AbapError::InvalidResponse` if the archive is not valid base64.
    pub async fn download_files(&self, name: &str) -> Result<Option<Bytes>, AbapError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "PascalCase")]
        struct Download {
            #[serde(default)]
            zip_archive: String,
        }

        let options = RequestOptions::new()
            .param("CodePage", "UTF8")
            .param("DownloadFiles", "RUNTIME");
        let download: Download = match self.odata.get(&repository(name), options).await {
            Ok(response) => response.odata_as()?,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let archive = general_purpose::STANDARD
            .decode(download.zip_archive.trim())
            .map_err(|e| AbapError::InvalidResponse(format!("archive is not base64: {e}")))?;
        Ok(Some(Bytes::from(archive)))
    }

    fn atom_payload(&self, request: &DeployRequest) -> String {
        let mut service_url = self.odata.url("", &[]);
        service_url.set_query(None);
        let service_url = service_url.as_str().trim_end_matches('/');
        let name = escape(request.name.as_str());
        let package = escape(request.package.to_uppercase());
        let description = escape(
            request
                .description
                .as_deref()
                .filter(|d| !d.is_empty())
                .unwrap_or(DEFAULT_DESCRIPTION),
        );
        let archive = general_purpose::STANDARD.encode(&request.archive);
        let updated = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        format!(
            r#"<entry xmlns="http://www.w3.org/2005/Atom" xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata" xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices" xml:base="{base}">
  <id>{base}/Repositories('{name}')</id>
  <title type="text">Repositories('{name}')</title>
  <updated>{updated}</updated>
  <category term="/UI5/ABAP_REPOSITORY_SRV.Repository" scheme="http://schemas.microsoft.com/ado/2007/08/dataservices/scheme"/>
  <link href="Repositories('{name}')" rel="edit" title="Repository"/>
  <content type="application/xml">
    <m:properties>
      <d:Name>{name}</d:Name>
      <d:Package>{package}</d:Package>
      <d:Description>{description}</d:Description>
      <d:ZipArchive>{archive}</d:ZipArchive>
      <d:Info/>
    </m:properties>
  </content>
</entry>"#,
            base = escape(service_url),
        )
    }

    fn write_options(transport: Option<&str>, test_mode: bool, safe_mode: bool) -> RequestOptions {
        let mut options = RequestOptions::new()
            .param("CodePage", "'UTF8'")
            .param("CondenseMessagesInHttpResponseHeader", "X")
            .param("format", "json");
        if let Some(transport) = transport.filter(|t| !t.is_empty()) {
            options = options.param("TransportRequest", transport);
        }
        if test_mode {
            options = options.param("TestMode", "true");
        }
        if !safe_mode {
            options = options.param("SafeMode", "false");
        }
        options
    }

    /// Create the application, or update it if it exists.
    ///
    /// Gateway and request timeouts are retried up to three attempts in
    /// total. A timed out write may still have been stored, so every retry
    /// checks again whether the application exists. In test mode a 403 is
    /// the backend's verdict, not a failure.
    ///
    /// # Errors
    ///
    /// Returns the last `AbapError` once the attempts are used up, or the
    /// first error that is not a timeout.
    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome, AbapError> {
        let payload = Bytes::from(self.atom_payload(request));
        let mut attempt = 1;

        loop {
            let exists = self.get_info(&request.name).await?.is_found();
            let options = Self::write_options(
                request.transport.as_deref(),
                request.test_mode,
                request.safe_mode,
            )
            .header("content-type", ATOM_ENTRY);

            tracing::info!(
                app = %request.name,
                attempt,
                update = exists,
                test_mode = request.test_mode,
                "deploying application"
            );
            let result = if exists {
                self.odata
                    .put(&repository(&request.name), payload.clone(), options)
                    .await
            } else {
                self.odata
                    .post("/Repositories", payload.clone(), options)
                    .await
            };

            match result {
                Ok(response) => {
                    if let Some(header) = response.header_str("sap-message") {
                        messages::log_sap_message(header);
                    }
                    tracing::info!(app = %request.name, status = %response.status, "deployment finished");
                    return Ok(outcome(&response));
                }
                Err(err) if request.test_mode && err.status() == Some(StatusCode::FORBIDDEN) => {
                    if let Some(body) = err.body_preview() {
                        messages::log_error(body, "test mode run rejected by the backend");
                    }
                    return Ok(DeployOutcome {
                        status: StatusCode::FORBIDDEN,
                        simulated: true,
                        message: err.body_preview().and_then(messages::parse_error_envelope),
                    });
                }
                Err(err) if is_timeout(&err) && attempt < MAX_DEPLOY_ATTEMPTS => {
                    tracing::warn!(
                        app = %request.name,
                        attempt,
                        error = %err,
                        "deployment timed out, retrying"
                    );
                    attempt += 1;
                }
                Err(err) => {
                    log_failure(&err, "deployment");
                    return Err(err);
                }
            }
        }
    }

    /// Delete the application. `None` if it does not exist.
    ///
    /// A 400 is retried once.
    ///
    /// # Errors
    ///
    /// Returns `AbapError` for failures of the lookup or the deletion.
    pub async fn undeploy(
        &self,
        request: &UndeployRequest,
    ) -> Result<Option<DeployOutcome>, AbapError> {
        if !self.get_info(&request.name).await?.is_found() {
            tracing::info!(app = %request.name, "application does not exist, nothing to undeploy");
            return Ok(None);
        }

        let mut attempt = 1;
        loop {
            let options =
                Self::write_options(request.transport.as_deref(), request.test_mode, true);
            match self.odata.delete(&repository(&request.name), options).await {
                Ok(response) => {
                    if let Some(header) = response.header_str("sap-message") {
                        messages::log_sap_message(header);
                    }
                    tracing::info!(app = %request.name, status = %response.status, "undeployment finished");
                    return Ok(Some(outcome(&response)));
                }
                Err(err)
                    if err.status() == Some(StatusCode::BAD_REQUEST)
                        && attempt < MAX_UNDEPLOY_ATTEMPTS =>
                {
                    tracing::warn!(app = %request.name, attempt, error = %err, "undeployment failed, retrying");
                    attempt += 1;
                }
                Err(err) => {
                    log_failure(&err, "undeployment");
                    return Err(err);
                }
            }
        }
    }
}
