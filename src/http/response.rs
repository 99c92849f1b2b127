//! Fixed responses produced by the balancer itself.
//!
//! Liveness failures always surface as 503 with a fixed body; relay failures
//! surface as 502. Nothing else is generated locally.

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;

/// Body sent when the addressed backend is marked dead.
pub const BACKEND_UNAVAILABLE: &str = "Backend server is not available";

/// Body sent when the pool has no live backend.
pub const NO_BACKEND_AVAILABLE: &str = "No backend server is available";

/// Body sent when relaying to the backend failed.
pub const UPSTREAM_FAILED: &str = "Upstream request failed";

pub fn backend_unavailable() -> Response<Body> {
    (StatusCode::SERVICE_UNAVAILABLE, BACKEND_UNAVAILABLE).into_response()
}

pub fn no_backend_available() -> Response<Body> {
    (StatusCode::SERVICE_UNAVAILABLE, NO_BACKEND_AVAILABLE).into_response()
}

pub fn bad_gateway() -> Response<Body> {
    (StatusCode::BAD_GATEWAY, UPSTREAM_FAILED).into_response()
}
