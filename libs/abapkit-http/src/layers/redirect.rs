//! Redirect policy for ABAP logon chains
//!
//! Unauthenticated requests against an ABAP system behind an identity
//! provider are bounced through one or more cross-origin redirects before a
//! login page is served. [`LoginRedirectPolicy`] follows those hops so the
//! final page reaches the connection validation logic, while:
//! - stripping credentials (`Authorization`, `Cookie`, `Proxy-Authorization`)
//!   once the chain leaves the original origin
//! - refusing HTTPS → HTTP downgrades
//! - bounding the number of hops

use crate::config::RedirectConfig;
use http::{Request, Uri, header};
use tower_http::follow_redirect::policy::{Action, Attempt, Policy};

const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Redirect policy used by [`HttpClient`](crate::HttpClient).
///
/// State is per request: tower-http clones the policy for every call.
#[derive(Debug, Clone)]
pub struct LoginRedirectPolicy {
    config: RedirectConfig,
    hops: usize,
    left_origin: bool,
}

impl LoginRedirectPolicy {
    #[must_use]
    pub fn new(config: RedirectConfig) -> Self {
        Self {
            config,
            hops: 0,
            left_origin: false,
        }
    }

    /// Same scheme, host and port. A missing scheme counts as https.
    fn is_same_origin(original: &Uri, target: &Uri) -> bool {
        let orig_scheme = original.scheme_str().unwrap_or("https");
        let target_scheme = target.scheme_str().unwrap_or("https");

        let orig_port = original
            .port_u16()
            .unwrap_or_else(|| default_port(orig_scheme));
        let target_port = target
            .port_u16()
            .unwrap_or_else(|| default_port(target_scheme));

        orig_scheme == target_scheme
            && original.host().unwrap_or("") == target.host().unwrap_or("")
            && orig_port == target_port
    }

    fn is_https_downgrade(original: &Uri, target: &Uri) -> bool {
        original.scheme_str().unwrap_or("https") == "https"
            && target.scheme_str().unwrap_or("https") == "http"
    }

    fn is_allowed_host(&self, target: &Uri) -> bool {
        target
            .host()
            .is_some_and(|host| self.config.allowed_redirect_hosts.contains(host))
    }
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "http" => 80,
        "https" => 443,
        _ => 0,
    }
}

impl<B: Clone, E> Policy<B, E> for LoginRedirectPolicy {
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, E> {
        self.hops += 1;
        if self.hops > self.config.max_redirects {
            tracing::debug!(
                hops = self.hops,
                max = self.config.max_redirects,
                "redirect limit reached"
            );
            return Ok(Action::Stop);
        }

        let original = attempt.previous();
        let target = attempt.location();

        if !self.config.allow_https_downgrade && Self::is_https_downgrade(original, target) {
            tracing::warn!(
                original = %original,
                target = %target,
                "blocking HTTPS to HTTP downgrade redirect"
            );
            return Ok(Action::Stop);
        }

        let same_origin = Self::is_same_origin(original, target);
        if self.config.same_origin_only && !same_origin && !self.is_allowed_host(target) {
            tracing::warn!(
                original = %original,
                target = %target,
                "blocking cross-origin redirect"
            );
            return Ok(Action::Stop);
        }

        if !same_origin {
            self.left_origin = true;
            tracing::debug!(target = %target, "following cross-origin redirect");
        }

        Ok(Action::Follow)
    }

    fn on_request(&mut self, request: &mut Request<B>) {
        if self.left_origin && self.config.strip_sensitive_headers {
            let headers = request.headers_mut();
            for name in SENSITIVE_HEADERS {
                if headers.remove(name).is_some() {
                    tracing::debug!(header = %name, "stripped credential header on cross-origin redirect");
                }
            }
        }
    }

    fn clone_body(&self, body: &B) -> Option<B> {
        Some(body.clone())
    }
}
