//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the pool from configuration and admit the configured backends
//! - Admit backends that appear in a reloaded config while serving

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::watcher::BackendWatcher;
use crate::config::{BackendConfig, ProxyConfig};
use crate::health::HealthProbe;
use crate::http::client::HttpClient;
use crate::load_balancer::{Backend, BackendError, RoundRobinPool, ServerPool, Upstream};

/// Build the pool and admit every configured backend, in order.
///
/// With health checks enabled this spawns probe tasks, so it must run inside
/// a Tokio runtime.
pub fn build_pool(
    config: &ProxyConfig,
    client: &HttpClient,
) -> Result<Arc<RoundRobinPool>, BackendError> {
    let pool = if config.health_check.enabled {
        RoundRobinPool::with_health_probe(HealthProbe::from_config(
            &config.health_check,
            client.clone(),
        ))
    } else {
        tracing::info!("Active health probes disabled");
        RoundRobinPool::new()
    };

    for entry in &config.backends {
        let backend =
            Backend::with_health_path(&entry.address, &config.health_check.path, client.clone())?;
        pool.add_backend(Arc::new(backend));
    }

    Ok(Arc::new(pool))
}

/// Admit the entries of `backends` that the pool does not hold yet.
///
/// Returns how many were admitted. Invalid entries are skipped with a warning.
pub fn admit_new_backends<P>(
    pool: &P,
    backends: &[BackendConfig],
    health_path: &str,
    client: &HttpClient,
) -> usize
where
    P: ServerPool<Peer = Backend> + ?Sized,
{
    let mut known: HashSet<Url> = pool
        .backends()
        .iter()
        .map(|b| b.address().clone())
        .collect();
    let mut admitted = 0;

    for entry in backends {
        let backend = match Backend::with_health_path(&entry.address, health_path, client.clone()) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(address = %entry.address, error = %e, "Skipping invalid backend");
                continue;
            }
        };

        if !known.insert(backend.address().clone()) {
            continue;
        }

        pool.add_backend(Arc::new(backend));
        admitted += 1;
    }

    admitted
}

/// Entries of `previous` that no longer appear in `current`.
///
/// Addresses compare without a trailing slash, as in validation.
pub fn dropped_backends<'a>(
    previous: &'a [BackendConfig],
    current: &[BackendConfig],
) -> Vec<&'a BackendConfig> {
    let listed: HashSet<&str> = current
        .iter()
        .map(|b| b.address.trim_end_matches('/'))
        .collect();

    previous
        .iter()
        .filter(|b| !listed.contains(b.address.trim_end_matches('/')))
        .collect()
}

/// Watch `path` and admit new backends from every valid reload until `shutdown` fires.
///
/// `file_backends` is the backend list the file held at startup. Backends
/// given on the command line are not part of it and never reported as dropped.
pub fn spawn_config_reloader(
    path: &Path,
    file_backends: Vec<BackendConfig>,
    pool: Arc<RoundRobinPool>,
    health_path: String,
    client: HttpClient,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<JoinHandle<()>, notify::Error> {
    let (watcher, mut updates) = BackendWatcher::new(path, &file_backends);
    let watcher = watcher.start()?;

    Ok(tokio::spawn(async move {
        // Dropping the watcher stops file notifications.
        let _watcher = watcher;
        let mut previous = file_backends;

        loop {
            tokio::select! {
                Some(backends) = updates.recv() => {
                    let admitted = admit_new_backends(pool.as_ref(), &backends, &health_path, &client);
                    for missing in dropped_backends(&previous, &backends) {
                        tracing::warn!(
                            backend = %missing.address,
                            "Backend removed from config; removal is not supported, keeping it"
                        );
                    }
                    tracing::info!(admitted, pool_size = pool.size(), "Config reload applied");
                    previous = backends;
                }
                _ = shutdown.recv() => break,
            }
        }

        tracing::debug!("Config reloader stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutConfig;
    use crate::http::client::build_client;

    fn config_with(addresses: &[&str], probes: bool) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.health_check.enabled = probes;
        config.backends = addresses.iter().map(|a| BackendConfig::new(*a)).collect();
        config
    }

    #[test]
    fn test_build_pool_admits_in_order() {
        let client = build_client(&TimeoutConfig::default());
        let config = config_with(&["http://127.0.0.1:3001", "http://127.0.0.1:3002"], false);

        let pool = build_pool(&config, &client).unwrap();

        let addresses: Vec<String> = pool
            .backends()
            .iter()
            .map(|b| b.address().to_string())
            .collect();
        assert_eq!(addresses, vec!["http://127.0.0.1:3001/", "http://127.0.0.1:3002/"]);
        assert_eq!(pool.running_probes(), 0);
    }

    #[test]
    fn test_build_pool_rejects_bad_backend() {
        let client = build_client(&TimeoutConfig::default());
        let config = config_with(&["https://127.0.0.1:3001"], false);
        assert!(matches!(
            build_pool(&config, &client),
            Err(BackendError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn test_build_pool_starts_one_probe_per_backend() {
        let client = build_client(&TimeoutConfig::default());
        let config = config_with(&["http://127.0.0.1:3001", "http://127.0.0.1:3002"], true);

        let pool = build_pool(&config, &client).unwrap();
        assert_eq!(pool.running_probes(), 2);

        pool.shutdown().await;
        assert_eq!(pool.running_probes(), 0);
    }

    #[test]
    fn test_admit_only_new_backends() {
        let client = build_client(&TimeoutConfig::default());
        let pool = build_pool(&config_with(&["http://127.0.0.1:3001"], false), &client).unwrap();

        let reloaded = vec![
            BackendConfig::new("http://127.0.0.1:3001/"),
            BackendConfig::new("http://127.0.0.1:3002"),
            BackendConfig::new("ftp://127.0.0.1:3003"),
        ];
        let admitted = admit_new_backends(pool.as_ref(), &reloaded, "/health", &client);

        assert_eq!(admitted, 1);
        assert_eq!(pool.size(), 2);

        // Reapplying the same config is a no-op, and shrinking it removes nothing.
        assert_eq!(admit_new_backends(pool.as_ref(), &reloaded, "/health", &client), 0);
        assert_eq!(admit_new_backends(pool.as_ref(), &[], "/health", &client), 0);
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_dropped_backends_only_from_previous_file() {
        let previous = vec![
            BackendConfig::new("http://127.0.0.1:3001"),
            BackendConfig::new("http://127.0.0.1:3002/"),
        ];
        let current = vec![
            BackendConfig::new("http://127.0.0.1:3002"),
            BackendConfig::new("http://127.0.0.1:3003"),
        ];

        let dropped = dropped_backends(&previous, &current);
        assert_eq!(dropped, vec![&BackendConfig::new("http://127.0.0.1:3001")]);

        // A backend the file never listed (e.g. from the command line) is not reported.
        assert!(dropped_backends(&current, &current).is_empty());
        assert!(dropped_backends(&[], &current).is_empty());
    }
}
