//! Integration tests for per-method policies following a watched file.

use hotswap_policy::core::KeySet;
use hotswap_policy::policy::{
    CircuitBreakerConfig, FailurePolicy, RetryKind, RetryPolicy, StopPolicy,
};
use hotswap_policy::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

fn client_monitor(path: &Path, key: &str) -> ConfigMonitor<ClientFileManager> {
    ConfigMonitorBuilder::new(path)
        .with_key(key)
        .with_manager(ClientFileManager::for_path(path).unwrap())
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retry_follows_file_rewrites() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("client.json");
    fs::write(
        &config_path,
        r#"{"svcA": {"retry": {"M1": {"failure_policy": {"stop_policy": {"max_retry_times": 2}}}}}}"#,
    )
    .unwrap();

    let monitor = client_monitor(&config_path, "svcA");
    let retries = init_retry_container(&monitor).unwrap();

    let expected_m1 = RetryPolicy::failure(FailurePolicy {
        stop_policy: StopPolicy {
            max_retry_times: 2,
            ..StopPolicy::default()
        },
        ..FailurePolicy::default()
    });
    assert_eq!(monitor.config().unwrap().retry.get("M1"), Some(&expected_m1));
    assert_eq!(retries.policy("M1"), Some(expected_m1));
    assert_eq!(retries.methods(), vec!["M1".to_string()]);

    fs::write(
        &config_path,
        r#"{"svcA": {"retry": {"M2": {"backup_policy": {"retry_delay_ms": 50}}}}}"#,
    )
    .unwrap();

    assert!(wait_until(|| !retries.contains("M1") && retries.contains("M2")).await);
    let m2 = retries.policy("M2").unwrap();
    assert_eq!(m2.kind(), Some(RetryKind::Backup));
    assert_eq!(m2.backup_policy.unwrap().retry_delay_ms, 50);
    assert_eq!(retries.len(), 1);

    let config = monitor.config().unwrap();
    let mut configured: Vec<&String> = config.retry.keys().collect();
    configured.sort();
    assert_eq!(configured, vec!["M2"]);
}

/// `{"svcA": {"retry": {...}}}` with a failure policy for each method.
fn retry_file(methods: &[String]) -> String {
    let entries: Vec<String> = methods
        .iter()
        .map(|m| format!(r#""{m}": {{"failure_policy": {{}}}}"#))
        .collect();
    format!(r#"{{"svcA": {{"retry": {{{}}}}}}}"#, entries.join(","))
}

#[test]
fn test_init_races_with_reload() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("client.json");
    let first: Vec<String> = (0..40).map(|i| format!("A{i}")).collect();
    let second = vec!["B".to_string()];

    for _ in 0..200 {
        fs::write(&config_path, retry_file(&first)).unwrap();
        let monitor = ConfigMonitorBuilder::new(&config_path)
            .with_key("svcA")
            .with_manager(ClientFileManager::for_path(&config_path).unwrap())
            .with_file_watch(false)
            .build()
            .unwrap();
        fs::write(&config_path, retry_file(&second)).unwrap();

        let retries = std::thread::scope(|scope| {
            let reloader = scope.spawn(|| monitor.reload().unwrap());
            let retries = init_retry_container(&monitor).unwrap();
            reloader.join().unwrap();
            retries
        });

        // Whatever the interleaving, the container matches the stored config.
        let config = monitor.config().unwrap();
        let mut configured: Vec<String> = config.retry.keys().cloned().collect();
        configured.sort();
        assert_eq!(configured, second);
        assert_eq!(retries.methods(), second);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retry_rejects_invalid_entries() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("client.json");
    fs::write(
        &config_path,
        r#"{"svcA": {"retry": {
            "X": {"failure_policy": {}, "backup_policy": {}},
            "Y": {"failure_policy": {"stop_policy": {"max_retry_times": 3}}},
            "Z": {"failure_policy": {"stop_policy": {"max_retry_times": 9}}}
        }}}"#,
    )
    .unwrap();

    let monitor = client_monitor(&config_path, "svcA");
    let retries = init_retry_container(&monitor).unwrap();

    assert!(retries.contains("Y"));
    assert!(!retries.contains("X"));
    assert!(!retries.contains("Z"));
    assert_eq!(retries.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_update_keeps_previous_policy() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("client.json");
    fs::write(
        &config_path,
        r#"{"svcA": {"retry": {"Y": {"failure_policy": {"stop_policy": {"max_retry_times": 3}}}}}}"#,
    )
    .unwrap();

    let monitor = client_monitor(&config_path, "svcA");
    monitor.watcher().stop_watching();
    let retries = init_retry_container(&monitor).unwrap();

    fs::write(
        &config_path,
        r#"{"svcA": {"retry": {"Y": {"failure_policy": {"stop_policy": {"max_retry_times": 99}}}}}}"#,
    )
    .unwrap();
    monitor.reload().unwrap();

    let y = retries.policy("Y").unwrap();
    assert_eq!(y.failure_policy.unwrap().stop_policy.max_retry_times, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wildcard_retry_and_timeout() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("client.json");
    fs::write(
        &config_path,
        r#"{"svcA": {
            "retry": {"*": {"failure_policy": {}}},
            "timeout": {"*": {"rpc_timeout_ms": 1000, "conn_timeout_ms": 50}, "Slow": {"rpc_timeout_ms": 5000}}
        }}"#,
    )
    .unwrap();

    let monitor = client_monitor(&config_path, "svcA");
    let retries = init_retry_container(&monitor).unwrap();
    let timeouts = init_rpc_timeout(&monitor).unwrap();

    assert_eq!(retries.policy("Echo").unwrap().kind(), Some(RetryKind::Failure));
    assert_eq!(
        timeouts.timeout("Echo").unwrap().rpc_timeout(),
        Some(Duration::from_millis(1000))
    );
    assert_eq!(
        timeouts.timeout("Slow").unwrap().rpc_timeout(),
        Some(Duration::from_millis(5000))
    );
    assert_eq!(timeouts.timeout("Slow").unwrap().conn_timeout(), None);

    // Dropping the timeout section removes every timeout.
    fs::write(&config_path, r#"{"svcA": {"retry": {"*": {"failure_policy": {}}}}}"#).unwrap();
    assert!(wait_until(|| timeouts.is_empty()).await);
    assert!(retries.policy("Echo").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_circuit_breaker_resets_removed_methods() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("client.json");
    fs::write(
        &config_path,
        r#"{"svcA": {"circuitbreaker": {
            "Echo": {"enable": true, "err_rate": 0.3, "min_sample": 100},
            "Ping": {"enable": false, "err_rate": 0.2, "min_sample": 10}
        }}}"#,
    )
    .unwrap();

    let monitor = client_monitor(&config_path, "svcA");
    let breakers = init_circuit_breaker(&monitor, "svcB").unwrap();

    let echo_key = service_cb_key("svcB", "Echo");
    let ping_key = service_cb_key("svcB", "Ping");
    assert_eq!(breakers.service_cb_config(&echo_key).err_rate, 0.3);
    assert!(!breakers.service_cb_config(&ping_key).enable);

    fs::write(
        &config_path,
        r#"{"svcA": {"circuitbreaker": {"Echo": {"enable": true, "err_rate": 0.3, "min_sample": 100}}}}"#,
    )
    .unwrap();

    assert!(
        wait_until(|| breakers.service_cb_config(&ping_key) == CircuitBreakerConfig::default())
            .await
    );
    assert_eq!(breakers.service_cb_config(&echo_key).min_sample, 100);
    assert!(breakers.keys().contains(&ping_key));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_consumers_on_separate_services() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("client.json");
    fs::write(
        &config_path,
        r#"{
            "svcA": {"retry": {"Echo": {"failure_policy": {}}}},
            "svcB": {"retry": {"Echo": {"backup_policy": {}}}}
        }"#,
    )
    .unwrap();

    let watcher = std::sync::Arc::new(FileWatcher::new(&config_path).unwrap());
    let monitor_a = ConfigMonitor::new("svcA", std::sync::Arc::clone(&watcher)).unwrap();
    monitor_a.set_manager(ClientFileManager::for_path(&config_path).unwrap());
    monitor_a.start().unwrap();
    let monitor_b = ConfigMonitor::new("svcB", std::sync::Arc::clone(&watcher)).unwrap();
    monitor_b.set_manager(ClientFileManager::for_path(&config_path).unwrap());
    monitor_b.start().unwrap();

    let retries_a = init_retry_container(&monitor_a).unwrap();
    let retries_b = init_retry_container(&monitor_b).unwrap();
    assert!(matches!(
        init_retry_container(&monitor_a),
        Err(ConfigError::DuplicateKey(_))
    ));

    assert_eq!(retries_a.policy("Echo").unwrap().kind(), Some(RetryKind::Failure));
    assert_eq!(retries_b.policy("Echo").unwrap().kind(), Some(RetryKind::Backup));
}

#[test]
fn test_key_set_example_diff() {
    let keys = KeySet::from_keys(["A", "B", "C"]);
    let next: HashSet<String> = ["B", "C", "D"].iter().map(|k| k.to_string()).collect();

    assert_eq!(keys.diff_and_emplace(next.clone()), vec!["A".to_string()]);
    assert_eq!(keys.snapshot(), next);
}

proptest! {
    #[test]
    fn prop_diff_returns_exactly_the_removed_keys(
        prev in proptest::collection::hash_set("[a-z]{1,4}", 0..16),
        next in proptest::collection::hash_set("[a-z]{1,4}", 0..16),
    ) {
        let keys = KeySet::from_keys(prev.iter().cloned());
        let removed = keys.diff_and_emplace(next.clone());

        let mut expected: Vec<String> = prev.difference(&next).cloned().collect();
        expected.sort();
        prop_assert_eq!(removed, expected);
        prop_assert_eq!(keys.snapshot(), next);
    }
}
