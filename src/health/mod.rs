//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! ServerPool::add_backend
//!     → probe.rs spawns one task for the backend
//!     → every interval: GET {address}/health
//!     → 200 → set_alive(true), anything else → set_alive(false)
//!
//! Pool shutdown
//!     → broadcast signal
//!     → every probe task exits
//! ```

pub mod probe;

pub use probe::{HealthProbe, ProbeError};
