//! Cross-origin and host policies for the HTTP listener.
//!
//! Response headers come from a tower-http [`CorsLayer`] driven by an
//! [`OriginPolicy`]. [`preflight`] sits outside it: every `OPTIONS` leaves
//! as 204 with no body, and actual requests whose `Origin` is outside the
//! allow-list are refused with 403 before reaching a handler.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{HeaderName, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::debug;

use crate::error::error_body;

/// Headers browsers and OpenAI SDKs send on cross-origin requests.
pub const ALLOW_HEADERS: &[&str] = &[
    "authorization",
    "content-type",
    "user-agent",
    "accept",
    "x-requested-with",
    "openai-beta",
    "x-stainless-arch",
    "x-stainless-async",
    "x-stainless-custom-poll-interval",
    "x-stainless-helper-method",
    "x-stainless-lang",
    "x-stainless-os",
    "x-stainless-package-version",
    "x-stainless-poll-helper",
    "x-stainless-retry-count",
    "x-stainless-runtime",
    "x-stainless-runtime-version",
    "x-stainless-timeout",
];

const ALLOW_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
];

/// Preflight results may be cached for 12 hours.
const MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

const EXTENSION_SCHEMES: &[&str] = &[
    "chrome-extension://",
    "moz-extension://",
    "safari-extension://",
    "ms-browser-extension://",
];

/// Origin allow-list with `*` wildcards.
///
/// A pattern may contain one `*`, which matches any run of characters
/// (`http://localhost:*`, `app://*`). A bare `*` allows everything.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allow_all: bool,
    exact: Vec<String>,
    wildcards: Vec<(String, String)>,
}

impl OriginPolicy {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self::default();
        for origin in origins {
            let origin = origin.as_ref().trim();
            if origin.is_empty() {
                continue;
            }
            if origin == "*" {
                policy.allow_all = true;
            } else if let Some((prefix, suffix)) = origin.split_once('*') {
                policy
                    .wildcards
                    .push((prefix.to_string(), suffix.to_string()));
            } else {
                policy.exact.push(origin.to_string());
            }
        }
        policy
    }

    pub fn allows(&self, origin: &str) -> bool {
        if self.allow_all || self.exact.iter().any(|o| o == origin) {
            return true;
        }
        if EXTENSION_SCHEMES.iter().any(|s| origin.starts_with(s)) {
            return true;
        }
        self.wildcards.iter().any(|(prefix, suffix)| {
            origin.len() >= prefix.len() + suffix.len()
                && origin.starts_with(prefix.as_str())
                && origin.ends_with(suffix.as_str())
        })
    }
}

/// Build the CORS layer for `policy`.
pub fn cors_layer(policy: Arc<OriginPolicy>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _parts| {
            origin.to_str().is_ok_and(|o| policy.allows(o))
        }))
        .allow_methods(ALLOW_METHODS)
        .allow_headers(
            ALLOW_HEADERS
                .iter()
                .copied()
                .map(HeaderName::from_static)
                .collect::<Vec<_>>(),
        )
        .max_age(MAX_AGE)
}

/// Outer half of the CORS policy.
pub async fn preflight(
    State(policy): State<Arc<OriginPolicy>>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() == Method::OPTIONS {
        let (mut parts, _) = next.run(req).await.into_parts();
        parts.status = StatusCode::NO_CONTENT;
        parts.headers.remove(header::CONTENT_LENGTH);
        return Response::from_parts(parts, Body::empty());
    }

    let origin = req
        .headers()
        .get(header::ORIGIN)
        .map(|v| v.to_str().map(|o| policy.allows(o)).unwrap_or(false));
    if origin == Some(false) {
        debug!(path = %req.uri().path(), "origin not allowed");
        return (StatusCode::FORBIDDEN, Json(error_body("origin not allowed"))).into_response();
    }

    next.run(req).await
}

/// Host-header check, enforced only when the listener is bound to loopback.
///
/// A page on a foreign domain that resolves to 127.0.0.1 still sends its
/// own `Host`, which lands here as 403.
pub async fn allowed_hosts(
    State(bound): State<Option<SocketAddr>>,
    req: Request,
    next: Next,
) -> Response {
    if !bound.is_some_and(|addr| addr.ip().is_loopback()) {
        return next.run(req).await;
    }

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let name = strip_port(host);

    if let Ok(ip) = name.parse::<IpAddr>() {
        if is_local_ip(ip) {
            return next.run(req).await;
        }
    } else if is_local_name(name) {
        if req.method() == Method::OPTIONS {
            return StatusCode::NO_CONTENT.into_response();
        }
        return next.run(req).await;
    }

    debug!(%host, "host not allowed");
    StatusCode::FORBIDDEN.into_response()
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(ip, _)| ip);
    }
    match host.rsplit_once(':') {
        // a bare IPv6 literal has more than one colon
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unique_local() || v6.is_unspecified(),
    }
}

fn is_local_name(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.is_empty()
        || name == "localhost"
        || [".localhost", ".local", ".internal"]
            .iter()
            .any(|suffix| name.ends_with(suffix))
}
