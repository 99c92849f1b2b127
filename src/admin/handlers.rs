use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::load_balancer::Upstream;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub pool_size: usize,
    pub alive_backends: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendStatus {
    pub address: String,
    pub health_url: String,
    pub alive: bool,
    pub active_connections: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let backends = state.pool.backends();
    let alive_backends = backends.iter().filter(|b| b.is_alive()).count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: if alive_backends > 0 { "serving" } else { "degraded" }.to_string(),
        pool_size: backends.len(),
        alive_backends,
    })
}

/// Membership snapshot in pool order.
pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    let statuses = state
        .pool
        .backends()
        .iter()
        .map(|b| BackendStatus {
            address: b.address().to_string(),
            health_url: b.health_url().to_string(),
            alive: b.is_alive(),
            active_connections: b.active_connections(),
        })
        .collect();

    Json(statuses)
}
