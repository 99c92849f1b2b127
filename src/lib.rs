//! Round-robin HTTP load balancer with active health probing.
//!
//! ```text
//!   client ──▶ http::LbServer ──▶ ServerPool::next_peer ──▶ Upstream::forward ──▶ backend
//!                                        ▲
//!                    health::HealthProbe ┘ (one task per backend, flips liveness)
//! ```

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use config::ProxyConfig;
pub use http::LbServer;
pub use lifecycle::Shutdown;
pub use load_balancer::{Backend, RoundRobinPool, ServerPool, Upstream};
