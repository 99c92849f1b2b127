//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum, request id, tracing)
//!     → pool selects a backend
//!     → backend relays through client.rs
//!     → response.rs for locally generated 502/503
//! ```

pub mod client;
pub mod response;
pub mod server;

pub use client::{build_client, HttpClient};
pub use server::{AppState, LbServer, SharedPool};
