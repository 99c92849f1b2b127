//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → backends new to the file are admitted to the running pool
//! ```
//!
//! All fields have defaults so an empty file is a valid config.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BackendConfig, HealthCheckConfig, ListenerConfig, ObservabilityConfig,
    ProxyConfig, TimeoutConfig,
};
pub use validation::ValidationError;
