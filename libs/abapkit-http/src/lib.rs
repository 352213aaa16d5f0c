#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP client infrastructure for abapkit
//!
//! A hyper-based client wrapped in a tower middleware stack:
//! - TLS via rustls, with an opt-in mode that accepts any server certificate
//!   (ABAP development systems frequently run on self-signed certificates)
//! - Connection pooling and per-request timeouts
//! - Redirect following suited to SAML identity-provider hops
//! - Default request headers (`User-Agent`, `Accept`, ...)
//! - A pluggable interceptor stack, see [`HttpClientBuilder::interceptor`]
//! - [`OneShot`], the armed/fired flag behind interceptors that must act once
//!
//! Retries are intentionally absent: the services built on top of this crate
//! own their retry loops because a timed out write may still have completed on
//! the backend.
//!
//! # Example
//!
//! ```ignore
//! use abapkit_http::HttpClient;
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .timeout(Duration::from_secs(30))
//!     .accept_invalid_certs(true)
//!     .build()?;
//!
//! let body: serde_json::Value = client
//!     .get("https://abap.example.com/sap/bc/ui2/app_index/")
//!     .send()
//!     .await?
//!     .json()
//!     .await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
pub mod security;
mod tls;

pub use builder::{HttpClientBuilder, HttpService};
pub use client::HttpClient;
pub use config::{
    DEFAULT_USER_AGENT, HttpClientConfig, RedirectConfig, TlsRootConfig, TransportSecurity,
};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{DefaultHeadersLayer, DefaultHeadersService, LoginRedirectPolicy, OneShot};
pub use request::RequestBuilder;
pub use response::{HttpResponse, ResponseBody, buffered_body, collect_body};
