//! Toy backend for trying the balancer locally.
//!
//! Answers every path, `/health` included, with a fixed greeting.

use std::net::SocketAddr;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::IntoResponse,
    Router,
};
use clap::Parser;
use tokio::net::TcpListener;

use round_robin_lb::observability::logging;

const GREETING: &str = "Hello from backend server!";

#[derive(Parser)]
#[command(name = "demo-backend")]
#[command(about = "Toy HTTP backend for the round-robin load balancer", long_about = None)]
struct Cli {
    /// Port for the server to listen on.
    #[arg(short, long, default_value_t = 3001)]
    port: u16,
}

async fn hello(request: Request<Body>) -> impl IntoResponse {
    tracing::info!(
        method = %request.method(),
        uri = %request.uri(),
        version = ?request.version(),
        host = ?request.headers().get(header::HOST),
        user_agent = ?request.headers().get(header::USER_AGENT),
        accept = ?request.headers().get(header::ACCEPT),
        "Replied with a hello message"
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        GREETING,
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init("info");

    let app = Router::new().fallback(hello);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Demo backend listening");

    axum::serve(listener, app).await?;
    Ok(())
}
