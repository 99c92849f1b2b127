//! Live backend admission from config file changes.

use std::fs;
use std::path::Path;
use std::time::Duration;

use round_robin_lb::config::load_config;
use round_robin_lb::lifecycle::startup::{build_pool, spawn_config_reloader};
use round_robin_lb::{ServerPool, Shutdown, Upstream};

mod common;

fn write_config(path: &Path, addresses: &[&str]) {
    let mut raw = String::from("[health_check]\nenabled = false\n\n");
    for address in addresses {
        raw.push_str(&format!("[[backends]]\naddress = \"{}\"\n\n", address));
    }
    fs::write(path, raw).unwrap();
}

async fn wait_for_size<P: ServerPool + ?Sized>(pool: &P, size: usize) -> bool {
    for _ in 0..50 {
        if pool.size() == size {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn test_rewritten_config_grows_pool() {
    let file = tempfile::NamedTempFile::new().unwrap();
    write_config(file.path(), &["http://127.0.0.1:3001"]);

    let config = load_config(file.path()).unwrap();
    let client = common::client();
    let pool = build_pool(&config, &client).unwrap();
    let shutdown = Shutdown::new();

    let reloader = spawn_config_reloader(
        file.path(),
        config.backends.clone(),
        pool.clone(),
        config.health_check.path.clone(),
        client,
        shutdown.subscribe(),
    )
    .unwrap();
    assert_eq!(pool.size(), 1);

    write_config(file.path(), &["http://127.0.0.1:3001", "http://127.0.0.1:3002"]);
    assert!(wait_for_size(pool.as_ref(), 2).await, "pool did not grow after reload");

    let addresses: Vec<String> = pool
        .backends()
        .iter()
        .map(|b| b.address().to_string())
        .collect();
    assert_eq!(addresses, vec!["http://127.0.0.1:3001/", "http://127.0.0.1:3002/"]);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), reloader)
        .await
        .expect("reloader did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_removed_and_invalid_entries_leave_pool_intact() {
    let file = tempfile::NamedTempFile::new().unwrap();
    write_config(file.path(), &["http://127.0.0.1:3001", "http://127.0.0.1:3002"]);

    let config = load_config(file.path()).unwrap();
    let client = common::client();
    let pool = build_pool(&config, &client).unwrap();
    let shutdown = Shutdown::new();

    let reloader = spawn_config_reloader(
        file.path(),
        config.backends.clone(),
        pool.clone(),
        config.health_check.path.clone(),
        client,
        shutdown.subscribe(),
    )
    .unwrap();

    // Invalid file: rejected by validation, nothing changes.
    fs::write(file.path(), "[[backends]]\naddress = \"ftp://127.0.0.1:21\"\n").unwrap();
    // Shrunk file plus one new backend: only the new one is admitted.
    write_config(file.path(), &["http://127.0.0.1:3003"]);
    assert!(wait_for_size(pool.as_ref(), 3).await, "new backend not admitted");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pool.size(), 3);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), reloader)
        .await
        .expect("reloader did not stop")
        .unwrap();
}
