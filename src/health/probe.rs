//! Active health probing.
//!
//! # Responsibilities
//! - Periodically GET each backend's health target
//! - Flip the backend's liveness on every result
//!
//! A single failed tick marks a backend dead and a single success revives it.
//! There is no threshold, backoff or jitter, so an intermittently slow backend
//! flaps at the probe interval.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use url::Url;

use crate::config::HealthCheckConfig;
use crate::http::client::HttpClient;
use crate::load_balancer::Upstream;
use crate::observability::metrics;

const PROBE_USER_AGENT: &str = "round-robin-lb-health-check";

/// Why a single probe failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid probe request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("connection error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status code: {0}")]
    Status(StatusCode),
}

/// Periodic reachability check, one task per backend.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: HttpClient,
    interval: Duration,
    timeout: Duration,
}

impl HealthProbe {
    pub fn new(client: HttpClient, interval: Duration, timeout: Duration) -> Self {
        Self {
            client,
            interval,
            timeout,
        }
    }

    pub fn from_config(config: &HealthCheckConfig, client: HttpClient) -> Self {
        Self::new(
            client,
            Duration::from_secs(config.interval_secs),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe `target` once. Only a `200 OK` counts as success.
    pub async fn check(&self, target: &Url) -> Result<(), ProbeError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(target.as_str())
            .header(header::USER_AGENT, PROBE_USER_AGENT)
            .body(Body::empty())?;

        let response = time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(ProbeError::Status(status)),
        }
    }

    /// Run one probe against `backend` and record the outcome as its liveness.
    pub async fn tick<U: Upstream>(&self, backend: &U) -> bool {
        let target = backend.health_url();
        let was_alive = backend.is_alive();

        let alive = match self.check(target).await {
            Ok(()) => {
                tracing::debug!(health_url = %target, "Health check passed");
                true
            }
            Err(e) => {
                tracing::warn!(health_url = %target, error = %e, "Health check failed");
                false
            }
        };

        backend.set_alive(alive);
        if alive != was_alive {
            tracing::info!(
                backend = %backend.address(),
                alive,
                "Backend liveness changed"
            );
        }
        metrics::record_probe(backend.address().as_str(), alive);

        alive
    }

    /// Probe `backend` every interval until `shutdown` fires or its sender is dropped.
    ///
    /// The first probe happens one interval after start.
    pub async fn run<U: Upstream>(self, backend: Arc<U>, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(
            health_url = %backend.health_url(),
            interval = ?self.interval,
            "Health probe starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(backend.as_ref()).await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!(backend = %backend.address(), "Health probe received shutdown signal");
                    break;
                }
            }
        }
    }

    /// Start [`HealthProbe::run`] as an independent task.
    pub fn spawn<U: Upstream>(
        &self,
        backend: Arc<U>,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(backend, shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutConfig;
    use crate::http::client::build_client;
    use crate::load_balancer::Backend;
    use tokio::net::TcpListener;

    async fn closed_port_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[test]
    fn test_from_config() {
        let config = HealthCheckConfig {
            interval_secs: 3,
            timeout_secs: 1,
            ..HealthCheckConfig::default()
        };
        let probe = HealthProbe::from_config(&config, build_client(&TimeoutConfig::default()));
        assert_eq!(probe.interval(), Duration::from_secs(3));
        assert_eq!(probe.timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_connection_refused_marks_dead() {
        let client = build_client(&TimeoutConfig::default());
        let backend = Backend::new(&closed_port_url().await, client.clone()).unwrap();
        let probe = HealthProbe::new(client, Duration::from_secs(60), Duration::from_secs(2));

        assert!(backend.is_alive());
        assert!(!probe.tick(&backend).await);
        assert!(!backend.is_alive());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let client = build_client(&TimeoutConfig::default());
        let backend = Arc::new(Backend::new(&closed_port_url().await, client.clone()).unwrap());
        let probe = HealthProbe::new(client, Duration::from_secs(3600), Duration::from_secs(1));

        let (tx, rx) = broadcast::channel(1);
        let task = probe.spawn(Arc::clone(&backend), rx);
        tx.send(()).unwrap();

        time::timeout(Duration::from_secs(5), task)
            .await
            .expect("probe did not stop")
            .unwrap();
        assert!(backend.is_alive(), "no tick should have happened");
    }
}
