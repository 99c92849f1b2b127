//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → ServerPool::next_peer (round-robin scan over live backends)
//!     → Upstream::forward (liveness check, connection accounting, relay)
//!     → relayed response, or 503 when nothing is alive
//!
//! ServerPool::add_backend
//!     → backend appended to the pool
//!     → health probe spawned for it (health::probe)
//! ```
//!
//! # Design Decisions
//! - Selection and membership live behind `ServerPool`, forwarding and liveness
//!   behind `Upstream`, so callers never depend on the round-robin specifics
//! - Liveness is a belief refreshed by probes, not a real-time fact; callers
//!   accept that a backend may be picked just before it is marked dead

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use url::Url;

pub mod backend;
pub mod pool;

pub use backend::{Backend, BackendError, DEFAULT_HEALTH_PATH};
pub use pool::RoundRobinPool;

/// One upstream endpoint: forwarding plus liveness.
pub trait Upstream: Send + Sync + 'static {
    /// Parsed base address of the endpoint.
    fn address(&self) -> &Url;

    /// Target probed by the health checker.
    fn health_url(&self) -> &Url;

    /// Current liveness belief.
    fn is_alive(&self) -> bool;

    /// Overwrite the liveness belief.
    fn set_alive(&self, alive: bool);

    /// Requests currently being relayed to this endpoint.
    fn active_connections(&self) -> usize;

    /// Relay one request and return the upstream response.
    ///
    /// A dead endpoint yields `503 Service Unavailable` without being contacted.
    /// Transport failures yield `502 Bad Gateway`. This never returns an error.
    fn forward(&self, request: Request<Body>) -> impl Future<Output = Response<Body>> + Send;
}

/// A set of upstreams plus a selection strategy.
pub trait ServerPool: Send + Sync {
    type Peer: Upstream;

    /// Snapshot of the current membership, in admission order.
    fn backends(&self) -> Vec<Arc<Self::Peer>>;

    /// Pick the next live upstream, or `None` when nothing is alive.
    fn next_peer(&self) -> Option<Arc<Self::Peer>>;

    /// Admit an upstream. Safe to call while traffic is being served.
    ///
    /// Pools that probe their members start the probe here, which needs a
    /// running Tokio runtime.
    fn add_backend(&self, backend: Arc<Self::Peer>);

    /// Current membership count.
    fn size(&self) -> usize;
}
