//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream HTTP endpoint
//! - Track liveness (written by the health probe, read by selection)
//! - Track active connections with a RAII guard
//! - Relay one request to the endpoint and stream the response back
//!
//! Liveness is read once when a relay starts. `set_alive` never waits for
//! in-flight relays, so a request admitted just before a backend is marked
//! dead still runs to completion.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        request::Parts,
        uri::{Authority, Scheme},
        Request, Response, Uri, Version,
    },
};
use futures_util::StreamExt;
use thiserror::Error;
use url::Url;

use crate::http::client::HttpClient;
use crate::http::response;
use crate::load_balancer::Upstream;

/// Health path used when none is configured.
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Headers that only apply to a single transport hop.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Errors building a backend from its address.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid backend address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported scheme '{0}', only http backends are supported")]
    UnsupportedScheme(String),

    #[error("backend address '{0}' has no usable host")]
    InvalidHost(String),

    #[error("invalid health path '{path}': {source}")]
    InvalidHealthPath {
        path: String,
        #[source]
        source: url::ParseError,
    },
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Base address requests are relayed to.
    address: Url,
    /// `host[:port]` used for the outbound URI.
    authority: Authority,
    /// Value written into the outbound `Host` header.
    host_header: HeaderValue,
    /// Probe target: address path + health path.
    health_url: Url,
    alive: AtomicBool,
    active_connections: Arc<AtomicUsize>,
    client: HttpClient,
}

impl Backend {
    /// Create a backend probed at [`DEFAULT_HEALTH_PATH`].
    pub fn new(address: &str, client: HttpClient) -> Result<Self, BackendError> {
        Self::with_health_path(address, DEFAULT_HEALTH_PATH, client)
    }

    /// Create a backend probed at `health_path` below its address.
    ///
    /// New backends start alive.
    pub fn with_health_path(
        address: &str,
        health_path: &str,
        client: HttpClient,
    ) -> Result<Self, BackendError> {
        let url = Url::parse(address).map_err(|source| BackendError::InvalidAddress {
            address: address.to_string(),
            source,
        })?;

        if url.scheme() != "http" {
            return Err(BackendError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| BackendError::InvalidHost(address.to_string()))?;
        let authority_str = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority_str)
            .map_err(|_| BackendError::InvalidHost(address.to_string()))?;
        let host_header = HeaderValue::from_str(&authority_str)
            .map_err(|_| BackendError::InvalidHost(address.to_string()))?;

        let health_url = health_target(&url, health_path)?;

        Ok(Self {
            address: url,
            authority,
            host_header,
            health_url,
            alive: AtomicBool::new(true),
            active_connections: Arc::new(AtomicUsize::new(0)),
            client,
        })
    }

    /// Count one in-flight request until the guard is dropped.
    pub(crate) fn acquire_connection(&self) -> ConnectionGuard {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
        ConnectionGuard {
            counter: Arc::clone(&self.active_connections),
        }
    }

    /// Turn an inbound request into the request sent to this backend.
    fn rewrite_request(&self, request: Request<Body>) -> Result<Request<Body>, axum::http::Error> {
        let (mut parts, body) = request.into_parts();

        parts.uri = self.upstream_uri(&parts.uri)?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        append_forwarded_for(&mut parts);
        parts.headers.insert(header::HOST, self.host_header.clone());

        Ok(Request::from_parts(parts, body))
    }

    /// Join the backend base path with the inbound path and merge both queries.
    fn upstream_uri(&self, inbound: &Uri) -> Result<Uri, axum::http::Error> {
        let path = join_paths(self.address.path(), inbound.path());
        let query = match (self.address.query(), inbound.query()) {
            (Some(base), Some(extra)) if !base.is_empty() && !extra.is_empty() => {
                Some(format!("{}&{}", base, extra))
            }
            (Some(base), _) if !base.is_empty() => Some(base.to_string()),
            (_, Some(extra)) => Some(extra.to_string()),
            _ => None,
        };
        let path_and_query = match query {
            Some(q) => format!("{}?{}", path, q),
            None => path,
        };

        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

impl Upstream for Backend {
    fn address(&self) -> &Url {
        &self.address
    }

    fn health_url(&self) -> &Url {
        &self.health_url
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    async fn forward(&self, request: Request<Body>) -> Response<Body> {
        tracing::debug!(
            backend = %self.address,
            method = %request.method(),
            uri = %request.uri(),
            host = ?request.headers().get(header::HOST),
            user_agent = ?request.headers().get(header::USER_AGENT),
            "Forwarding request"
        );

        if !self.is_alive() {
            tracing::debug!(backend = %self.address, "Backend marked dead, rejecting");
            return response::backend_unavailable();
        }

        let guard = self.acquire_connection();

        let outbound = match self.rewrite_request(request) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(backend = %self.address, error = %e, "Failed to build upstream request");
                return response::bad_gateway();
            }
        };

        match self.client.request(outbound).await {
            Ok(upstream) => {
                let (mut parts, body) = upstream.into_parts();
                strip_hop_by_hop(&mut parts.headers);

                // The guard rides along with the body so the count drops only
                // once the response has been fully relayed (or abandoned).
                let body = Body::new(body).into_data_stream().map(move |chunk| {
                    let _held = &guard;
                    chunk
                });

                Response::from_parts(parts, Body::from_stream(body))
            }
            Err(e) => {
                tracing::warn!(backend = %self.address, error = %e, "Upstream request failed");
                response::bad_gateway()
            }
        }
    }
}

/// A RAII guard that manages the active connection count.
#[derive(Debug)]
pub(crate) struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

fn health_target(address: &Url, health_path: &str) -> Result<Url, BackendError> {
    let base = address.path().trim_end_matches('/');
    let mut url = address.clone();
    url.set_query(None);
    let joined = format!("{}/{}", base, health_path.trim_start_matches('/'));
    url.join(&joined)
        .map_err(|source| BackendError::InvalidHealthPath {
            path: health_path.to_string(),
            source,
        })
}

/// Join two URI paths with exactly one slash between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_str(name.trim()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

fn append_forwarded_for(parts: &mut Parts) {
    let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() else {
        return;
    };
    let client_ip = peer.ip().to_string();

    let prior: Vec<&str> = parts
        .headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    let value = if prior.is_empty() {
        client_ip
    } else {
        format!("{}, {}", prior.join(", "), client_ip)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        parts
            .headers
            .insert(HeaderName::from_static(X_FORWARDED_FOR), value);
    }
}
