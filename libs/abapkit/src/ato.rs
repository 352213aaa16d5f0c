//! ABAP tenant operations (ATO) settings.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::connection::Connection;
use crate::error::AbapError;

pub const PATH: &str = "/sap/bc/adt/ato/settings";

/// Tenant settings reported by `/sap/bc/adt/ato/settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtoSettings {
    pub development_package: Option<String>,
    pub development_prefix: Option<String>,
    pub operations_type: Option<String>,
    pub tenant_type: Option<String>,
    pub is_extensibility_development_system: bool,
    pub is_transport_request_required: bool,
}

impl AtoSettings {
    /// Parse the settings document. Attributes are matched by local name,
    /// whatever their namespace prefix.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::Xml` for malformed XML.
    pub fn from_xml(xml: &str) -> Result<Self, AbapError> {
        let mut reader = Reader::from_str(xml);
        let mut settings = Self::default();
        let mut tenant_role = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"settings" => {
                    for attr in e.attributes() {
                        let attr = attr.map_err(quick_xml::Error::from)?;
                        let value = attr.unescape_value()?.into_owned();
                        match attr.key.local_name().as_ref() {
                            b"developmentPackage" => settings.development_package = Some(value),
                            b"developmentPrefix" => settings.development_prefix = Some(value),
                            b"operationsType" => settings.operations_type = Some(value),
                            b"tenantType" => settings.tenant_type = Some(value),
                            b"tenantRole" => tenant_role = Some(value),
                            b"isExtensibilityDevelopmentSystem" => {
                                settings.is_extensibility_development_system = value == "true";
                            }
                            b"isTransportRequestRequired" => {
                                settings.is_transport_request_required = value == "true";
                            }
                            _ => {}
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if settings.tenant_type.is_none() {
            settings.tenant_type = tenant_role;
        }
        Ok(settings)
    }

    /// `true` for a customer tenant of an S/4HANA Cloud system: operations
    /// type `C` and a development prefix.
    #[must_use]
    pub fn is_s4_cloud(&self) -> bool {
        self.tenant_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("CUSTOMER"))
            && self.operations_type.as_deref() == Some("C")
            && self
                .development_prefix
                .as_deref()
                .is_some_and(|p| !p.is_empty())
    }
}

/// GET and parse the ATO settings of the connected system.
///
/// # Errors
///
/// Returns `AbapError::Http` for transport failures and non-2xx statuses
/// and `AbapError::Xml` for an unreadable document.
pub async fn fetch_settings(conn: &Connection) -> Result<AtoSettings, AbapError> {
    let url = conn.url(PATH, &[]);
    let body = conn
        .client()
        .get(url.as_str())
        .header("accept", "application/*")
        .send()
        .await?
        .checked_bytes()
        .await?;
    let settings = AtoSettings::from_xml(&String::from_utf8_lossy(&body))?;
    tracing::debug!(?settings, "loaded ATO settings");
    Ok(settings)
}
