//! Read-only admin API over the pool.

pub mod auth;
pub mod handlers;

use std::io;
use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::http::SharedPool;

use self::auth::admin_auth_middleware;
use self::handlers::{get_backends, get_status};

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub pool: SharedPool,
    /// Bearer token; `None` leaves the API open.
    pub api_key: Option<Arc<str>>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(get_backends))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve_admin(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
