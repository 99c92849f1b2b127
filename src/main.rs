//! Round-robin load balancer.
//!
//! Loads configuration, admits the configured backends (each with its own
//! health probe) and balances every inbound request across the live ones.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use round_robin_lb::admin::{self, AdminState};
use round_robin_lb::config::{load_config, validation::validate_config, BackendConfig, ConfigError, ProxyConfig};
use round_robin_lb::http::{build_client, LbServer, SharedPool};
use round_robin_lb::lifecycle::{signals, startup, Shutdown};
use round_robin_lb::observability::{logging, metrics};
use round_robin_lb::ServerPool;

/// Backends used when neither the config file nor the command line names any.
const DEFAULT_BACKENDS: [&str; 2] = ["http://localhost:3001", "http://localhost:3002"];

#[derive(Parser)]
#[command(name = "round-robin-lb")]
#[command(about = "Round-robin HTTP load balancer with active health checks", long_about = None)]
struct Cli {
    /// TOML configuration file; watched for new backends.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL, appended to the configured ones (repeatable).
    #[arg(short, long = "backend", value_name = "URL")]
    backends: Vec<String>,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    let file_backends = config.backends.clone();
    config
        .backends
        .extend(cli.backends.iter().map(BackendConfig::new));
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if config.backends.is_empty() {
        config.backends = DEFAULT_BACKENDS.iter().map(|a| BackendConfig::new(*a)).collect();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        probe_interval_secs = config.health_check.interval_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let client = build_client(&config.timeouts);
    let pool = startup::build_pool(&config, &client)?;
    let shared: SharedPool = pool.clone();

    let shutdown = Arc::new(Shutdown::new());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            signals::shutdown_signal().await;
            shutdown.trigger();
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState {
            pool: Arc::clone(&shared),
            api_key: config.admin.api_key.as_deref().map(Arc::from),
        };
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve_admin(admin_listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    if let Some(path) = &cli.config {
        if let Err(e) = startup::spawn_config_reloader(
            path,
            file_backends,
            Arc::clone(&pool),
            config.health_check.path.clone(),
            client.clone(),
            shutdown.subscribe(),
        ) {
            tracing::error!(error = %e, "Config watcher unavailable, backends are fixed");
        }
    }

    tracing::info!(pool_size = pool.size(), "Load balancer started");

    LbServer::new(shared).run(listener, shutdown.subscribe()).await?;

    pool.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
