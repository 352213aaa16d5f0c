#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Client for the OData and REST services of an ABAP system.
//!
//! A [`ServiceProvider`] owns one HTTP connection to a backend together with
//! its session state (cookies, CSRF token, SAML fallback). Services are
//! handed out per mount path and share that connection:
//!
//! ```ignore
//! let provider = AbapServiceProvider::create_for_abap(&config)?;
//! let catalog = provider.catalog(ODataVersion::V2)?;
//! for service in catalog.list_services().await? {
//!     println!("{} {}", service.name, service.path);
//! }
//! ```
//!
//! Specialized services:
//! - [`catalog`]: OData v2 and v4 service catalogs
//! - [`deploy::Ui5AbapRepositoryService`]: deploy and undeploy BSP applications
//! - [`deploy::LayeredRepositoryService`]: adaptation project variants
//! - [`app_index::AppIndexService`]: UI5 application index
//! - [`ato`]: tenant settings used to detect S/4HANA Cloud systems

pub mod app_index;
pub mod ato;
pub mod catalog;
mod config;
pub mod connection;
pub mod deploy;
mod error;
pub mod odata;
pub mod provider;

pub use config::{BasicAuth, ProviderConfig};
pub use error::{AbapError, ConnectionError, ODataRequestError};
pub use odata::{ODataResponse, ODataService, ODataVersion, RequestOptions, ServiceDocument};
pub use provider::{
    AbapService, AbapServiceProvider, BtpOptions, Lookup, ReentranceOptions, ServiceProvider,
};
