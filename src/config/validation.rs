//! Configuration validation.
//!
//! Serde handles syntax; this pass checks addresses, ranges and duplicates.
//! Every violation is reported, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidSocketAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("health_check.path must start with '/', got '{0}'")]
    InvalidHealthPath(String),

    #[error("backend '{address}': {reason}")]
    InvalidBackend { address: String, reason: String },

    #[error("backend '{0}' is listed more than once")]
    DuplicateBackend(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_socket_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if config.health_check.interval_secs == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "health_check.interval_secs",
        });
    }
    if config.health_check.timeout_secs == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "health_check.timeout_secs",
        });
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroDuration {
            field: "timeouts.connect_secs",
        });
    }
    if !config.health_check.path.starts_with('/') {
        errors.push(ValidationError::InvalidHealthPath(
            config.health_check.path.clone(),
        ));
    }

    let mut seen = HashSet::new();
    for backend in &config.backends {
        if let Err(reason) = check_backend_url(&backend.address) {
            errors.push(ValidationError::InvalidBackend {
                address: backend.address.clone(),
                reason,
            });
            continue;
        }
        if !seen.insert(backend.address.trim_end_matches('/')) {
            errors.push(ValidationError::DuplicateBackend(backend.address.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidSocketAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_backend_url(address: &str) -> Result<(), String> {
    let url = Url::parse(address).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}
