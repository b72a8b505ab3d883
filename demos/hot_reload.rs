//! Example demonstrating file watching and automatic hot-reload.
//!
//! This example shows how to:
//! - Build a monitor for one service key of a shared file
//! - Follow file changes through the file watcher
//! - Register a callback that runs after every successful refresh
//!
//! Run with: cargo run --example hot_reload --features json
//!
//! While running, try editing demos/config/hot_reload.json to see automatic reloads.
//! Write invalid JSON and the last good config stays in place.

use hotswap_policy::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, Clone)]
struct ServiceConfig {
    port: u16,
    host: String,
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Hot Reload Example ===\n");

    let config_path = "demos/config/hot_reload.json";
    if !std::path::Path::new(config_path).exists() {
        std::fs::write(
            config_path,
            r#"{"svcA": {"port": 8080, "host": "localhost", "max_connections": 10}}"#,
        )?;
        println!("Created {}", config_path);
    }

    let reload_count = Arc::new(AtomicUsize::new(0));
    let reload_count_clone = Arc::clone(&reload_count);

    let monitor = ConfigMonitorBuilder::new(config_path)
        .with_key("svcA")
        .with_manager(FileManager::<ServiceConfig>::for_path(config_path)?)
        .with_callback(
            "reload-counter",
            Arc::new(move || {
                let count = reload_count_clone.fetch_add(1, Ordering::SeqCst) + 1;
                println!("\n[Event] Configuration refreshed (refresh #{})", count);
            }),
        )
        .build()?;

    println!("Monitoring key '{}' in {}\n", monitor.key(), config_path);

    if let Some(cfg) = monitor.config() {
        println!("Current configuration:");
        println!("  Server: {}:{}", cfg.host, cfg.port);
        println!("  Max connections: {}", cfg.max_connections);
    }

    println!(
        "\n===> Try editing {} to see automatic reloads! <===",
        config_path
    );
    println!("     Example changes:");
    println!("     - Change port: 8080 -> 9090");
    println!("     - Remove the svcA entry (the old config is kept)");
    println!("     - Delete the file (the watcher stops)");
    println!("\nPress Ctrl+C to exit\n");

    let watcher = Arc::clone(monitor.watcher());
    let mut status = tokio::time::interval(tokio::time::Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = watcher.stopped() => {
                println!("[Status] Watcher stopped, the file is gone");
                break;
            }
            _ = status.tick() => {
                let count = reload_count.load(Ordering::SeqCst);
                if let Some(cfg) = monitor.config() {
                    println!("[Status] Config check (refreshes: {}):", count);
                    println!("  Server: {}:{}\n", cfg.host, cfg.port);
                }
            }
        }
    }

    monitor.stop();
    watcher.stop_watching();
    Ok(())
}
