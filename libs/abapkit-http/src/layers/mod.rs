//! Tower layers for the HTTP client middleware stack
//!
//! - [`DefaultHeadersLayer`] - Adds `User-Agent` and configured default headers
//! - [`LoginRedirectPolicy`] - Redirect policy for identity-provider hops
//! - [`OneShot`] - Armed/fired primitive for self-removing interceptors

mod default_headers;
mod once;
mod redirect;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
pub use once::OneShot;
pub use redirect::LoginRedirectPolicy;
