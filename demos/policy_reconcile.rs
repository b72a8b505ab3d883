//! Example wiring retry, circuit-breaker and timeout policies to a YAML file.
//!
//! Each consumer installs the entries of its section for `svcA` and removes
//! the methods that disappear on the next write.
//!
//! Run with: cargo run --example policy_reconcile --features yaml
//!
//! While running, edit demos/config/policies.yaml: delete the `Upload` retry
//! entry and watch it disappear, or drop the `Echo` breaker entry and watch it
//! fall back to the default thresholds.

use hotswap_policy::prelude::*;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "demos/config/policies.yaml";
const METHODS: [&str; 3] = ["Echo", "Upload", "Slow"];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Policy Reconcile Example ===\n");

    let monitor = ConfigMonitorBuilder::new(CONFIG_PATH)
        .with_key("svcA")
        .with_manager(ClientFileManager::for_path(CONFIG_PATH)?)
        .build()?;

    let retries = init_retry_container(&monitor)?;
    let breakers = init_circuit_breaker(&monitor, "svcB")?;
    let timeouts = init_rpc_timeout(&monitor)?;

    println!("Installed retry policies: {:?}", retries.methods());
    println!("Explicit breakers: {:?}", breakers.keys());
    println!("Timeouts installed: {}", timeouts.len());
    println!("\nEdit {} and press Ctrl+C to exit\n", CONFIG_PATH);

    let mut status = tokio::time::interval(tokio::time::Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = monitor.watcher().stopped() => {
                println!("Watcher stopped, the file is gone");
                break;
            }
            _ = status.tick() => {
                println!("[Status] Policies for svcA:");
                for method in METHODS {
                    println!(
                        "  {:<7} retry={:?} timeout={:?} breaker={:?}",
                        method,
                        retries.policy(method).and_then(|p| p.kind()),
                        timeouts.timeout(method).and_then(|t| t.rpc_timeout()),
                        breakers.service_cb_config(&service_cb_key("svcB", method)),
                    );
                }
                println!();
            }
        }
    }

    monitor.stop();
    monitor.watcher().stop_watching();
    Ok(())
}
