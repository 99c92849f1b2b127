//! Shared upstream HTTP client.
//!
//! One client (and one connection pool) is shared by every backend and by the
//! health prober. Timeouts are transport level only; there is no per-request
//! deadline.

use std::time::Duration;

use axum::body::Body;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};

use crate::config::TimeoutConfig;

/// Client used to relay requests and to probe backends.
pub type HttpClient = Client<HttpConnector, Body>;

/// Build the upstream client from the configured transport timeouts.
pub fn build_client(config: &TimeoutConfig) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(config.connect_secs)));

    Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(Duration::from_secs(config.idle_secs))
        .build(connector)
}
