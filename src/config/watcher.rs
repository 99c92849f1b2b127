//! Backend list watcher.
//!
//! Only `[[backends]]` is reloadable. The file is re-read and validated on
//! every change, and the backend list is sent on when it differs from the
//! last one seen. Every other section is read once at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::BackendConfig;

/// Watches the config file and publishes changed backend lists.
pub struct BackendWatcher {
    path: PathBuf,
    last: Vec<BackendConfig>,
    update_tx: mpsc::UnboundedSender<Vec<BackendConfig>>,
}

impl BackendWatcher {
    /// `current` is the list the pool was built from; an unchanged file is not re-sent.
    pub fn new(
        path: &Path,
        current: &[BackendConfig],
    ) -> (Self, mpsc::UnboundedReceiver<Vec<BackendConfig>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                last: current.to_vec(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Re-read the file. Returns the backend list when it changed.
    ///
    /// An unreadable or invalid file keeps the last list.
    fn reload(&mut self) -> Option<Vec<BackendConfig>> {
        let backends = match load_config(&self.path) {
            Ok(config) => config.backends,
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Failed to reload config, keeping current backends");
                return None;
            }
        };

        if backends == self.last {
            tracing::debug!(path = ?self.path, "Config changed but backend list did not");
            return None;
        }

        self.last = backends.clone();
        Some(backends)
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn start(mut self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Some(backends) = self.reload() {
                        tracing::info!(path = ?self.path, backends = backends.len(), "Backend list changed");
                        let _ = self.update_tx.send(backends);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_backends(path: &Path, addresses: &[&str]) {
        let raw: String = addresses
            .iter()
            .map(|a| format!("[[backends]]\naddress = \"{}\"\n\n", a))
            .collect();
        fs::write(path, raw).unwrap();
    }

    #[test]
    fn test_reload_reports_only_changes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_backends(file.path(), &["http://127.0.0.1:3001"]);

        let current = vec![BackendConfig::new("http://127.0.0.1:3001")];
        let (mut watcher, _rx) = BackendWatcher::new(file.path(), &current);

        assert_eq!(watcher.reload(), None);

        write_backends(file.path(), &["http://127.0.0.1:3001", "http://127.0.0.1:3002"]);
        assert_eq!(
            watcher.reload(),
            Some(vec![
                BackendConfig::new("http://127.0.0.1:3001"),
                BackendConfig::new("http://127.0.0.1:3002"),
            ])
        );
        assert_eq!(watcher.reload(), None);
    }

    #[test]
    fn test_invalid_file_keeps_last_list() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let current = vec![BackendConfig::new("http://127.0.0.1:3001")];
        let (mut watcher, _rx) = BackendWatcher::new(file.path(), &current);

        fs::write(file.path(), "[[backends]]\naddress = \"ftp://127.0.0.1:21\"\n").unwrap();
        assert_eq!(watcher.reload(), None);

        fs::write(file.path(), "this is not toml [").unwrap();
        assert_eq!(watcher.reload(), None);
        assert_eq!(watcher.last, current);
    }
}
