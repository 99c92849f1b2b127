//! Round-robin backend pool.
//!
//! # Responsibilities
//! - Own the ordered backend list and the round-robin cursor
//! - Select the next live backend
//! - Start a health probe for every admitted backend
//! - Stop all probes on shutdown

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::health::probe::HealthProbe;
use crate::lifecycle::Shutdown;
use crate::load_balancer::{backend::Backend, ServerPool, Upstream};

/// Backends and cursor share one lock so a scan sees a consistent pair.
struct PoolState<U> {
    backends: Vec<Arc<U>>,
    /// Always `< backends.len()` once the pool is non-empty.
    cursor: usize,
}

/// Pool that hands out live backends in rotation.
///
/// Every call to [`ServerPool::next_peer`] advances the cursor once per
/// candidate it looks at, dead or alive, so the rotation position carries
/// over between calls.
pub struct RoundRobinPool<U: Upstream = Backend> {
    state: RwLock<PoolState<U>>,
    probe: Option<HealthProbe>,
    shutdown: Shutdown,
    probe_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<U: Upstream> RoundRobinPool<U> {
    /// Create an empty pool that does not probe its backends.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an empty pool that starts `probe` for every admitted backend.
    ///
    /// Backends must then be added from within a Tokio runtime; outside one
    /// they are admitted unprobed.
    pub fn with_health_probe(probe: HealthProbe) -> Self {
        Self::build(Some(probe))
    }

    fn build(probe: Option<HealthProbe>) -> Self {
        Self {
            state: RwLock::new(PoolState {
                backends: Vec::new(),
                cursor: 0,
            }),
            probe,
            shutdown: Shutdown::new(),
            probe_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Number of probe tasks that have not exited.
    pub fn running_probes(&self) -> usize {
        self.probe_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Stop every probe and wait for them to exit.
    ///
    /// Backends admitted afterwards are not probed.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();

        let tasks = std::mem::take(
            &mut *self
                .probe_tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let count = tasks.len();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Health probe task ended abnormally");
            }
        }

        tracing::info!(probes = count, "Health probes stopped");
    }

    fn read_state(&self) -> RwLockReadGuard<'_, PoolState<U>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, PoolState<U>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_probe(&self, probe: &HealthProbe, backend: Arc<U>) {
        if Handle::try_current().is_err() {
            tracing::error!(backend = %backend.address(), "No Tokio runtime, backend admitted without a health probe");
            return;
        }

        // Subscribe before checking the flag: a trigger landing in between is
        // still delivered to this receiver.
        let signal = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            tracing::debug!(backend = %backend.address(), "Pool shut down, not probing new backend");
            return;
        }

        let task = probe.spawn(backend, signal);
        self.probe_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}

impl<U: Upstream> Default for RoundRobinPool<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: Upstream> ServerPool for RoundRobinPool<U> {
    type Peer = U;

    fn backends(&self) -> Vec<Arc<U>> {
        self.read_state().backends.clone()
    }

    fn next_peer(&self) -> Option<Arc<U>> {
        // Exclusive: the scan moves the cursor.
        let mut state = self.write_state();
        let len = state.backends.len();

        for _ in 0..len {
            let candidate = Arc::clone(&state.backends[state.cursor]);
            state.cursor = (state.cursor + 1) % len;

            if candidate.is_alive() {
                return Some(candidate);
            }
        }

        if len > 0 {
            tracing::debug!(pool_size = len, "No live backend in pool");
        }
        None
    }

    fn add_backend(&self, backend: Arc<U>) {
        let pool_size = {
            let mut state = self.write_state();
            state.backends.push(Arc::clone(&backend));
            state.backends.len()
        };

        tracing::info!(backend = %backend.address(), pool_size, "Backend admitted to pool");

        if let Some(probe) = &self.probe {
            self.start_probe(probe, backend);
        }
    }

    fn size(&self) -> usize {
        self.read_state().backends.len()
    }
}
