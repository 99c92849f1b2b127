//! HTTP front end.
//!
//! # Responsibilities
//! - Accept every method and path on one handler
//! - Ask the pool for the next live backend
//! - Forward to it, or answer 503 when nothing is alive
//! - Wire up request ids and request tracing

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::http::response;
use crate::load_balancer::{Backend, ServerPool, Upstream};
use crate::observability::metrics;

/// Pool handle shared with every request.
pub type SharedPool = Arc<dyn ServerPool<Peer = Backend>>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SharedPool,
}

/// HTTP server that balances every request over the pool.
pub struct LbServer {
    router: Router,
}

impl LbServer {
    pub fn new(pool: SharedPool) -> Self {
        let router = Self::build_router(AppState { pool });
        Self { router }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(balance_handler))
            .route("/", any(balance_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Load balancer listening");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Select a peer and forward, per request.
async fn balance_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();

    let Some(peer) = state.pool.next_peer() else {
        tracing::warn!(
            method = %method,
            path = %request.uri().path(),
            pool_size = state.pool.size(),
            "No backend available"
        );
        let response = response::no_backend_available();
        metrics::record_request(&method, response.status().as_u16(), metrics::NO_BACKEND, start_time);
        return response;
    };

    tracing::debug!(backend = %peer.address(), "Selected peer");

    let response = peer.forward(request).await;

    metrics::record_request(
        &method,
        response.status().as_u16(),
        peer.address().as_str(),
        start_time,
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::RoundRobinPool;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_empty_pool_is_503() {
        let pool: SharedPool = Arc::new(RoundRobinPool::<Backend>::new());
        let router = LbServer::new(pool).router;

        let res = router
            .oneshot(Request::builder().uri("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(res.headers().contains_key("x-request-id"));
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], response::NO_BACKEND_AVAILABLE.as_bytes());
    }
}
