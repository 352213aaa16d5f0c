#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Interactive authentication for ABAP systems.
//!
//! Both flows spin up a short-lived HTTP server on `127.0.0.1`, point the
//! user's browser at the backend and wait for the browser to be redirected
//! back with a code or ticket:
//!
//! - [`Uaa`]: OAuth2 authorization-code and refresh-token grants against the
//!   UAA of an ABAP environment on BTP
//! - [`ReentranceTicket`]: SAML reentrance ticket issued by the ABAP system
//!
//! The results feed the tower interceptors in [`layer`] that authenticate
//! requests sent through an [`abapkit_http::HttpClient`].

pub mod browser;
mod error;
pub mod http_error;
pub mod layer;
mod page;
pub mod redirect;
pub mod reentrance;
pub mod uaa;

pub use abapkit_utils::SecretString;
pub use browser::{BrowserLauncher, SystemBrowser};
pub use error::{AuthError, AuthFlow};
pub use layer::{BearerAuthLayer, TICKET_HEADER, TicketAuthLayer, TokenSource};
pub use redirect::RedirectCapture;
pub use reentrance::{ReentranceTicket, ui_url};
pub use uaa::{RefreshTokenCallback, ServiceKey, TokenGrant, Uaa, UaaConfig, UaaTokenSource};
