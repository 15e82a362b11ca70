/*!
 * Integration tests for the reconciliation loop
 *
 * Drives `Monitor::run_cycle` against in-memory servers and platforms:
 * - Per-server failure isolation
 * - Recovery shares never submitted
 * - Platform-sourced topology fully replacing the address book
 * - Stage-then-swap on a failed refresh
 */

use baomon::{
    commands::CommandContext,
    config::{KeyShard, MonitorConfig, ServerAddress},
    error::MonitorError,
    platform::MockPlatform,
    unseal::run_unseal,
    FixedClientFactory, HttpClientFactory, Monitor, TopologyResolver,
};
use bao_client::MockSecretStore;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_test::assert_err;

const ROOT: &str = "s.abcdefghijklmnopqrstuvwx";

fn shard(key: &str) -> KeyShard {
    KeyShard {
        key: key.to_string(),
        key_base64: "Chs=".to_string(),
    }
}

fn static_config(hosts: &[&str], shards: &[(&str, &str)]) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    for host in hosts {
        config.server_addresses.insert(
            host.to_string(),
            ServerAddress {
                host: format!("{}.example", host),
                port: 8200,
            },
        );
    }
    for (name, key) in shards {
        config.unseal_key_shards.insert(name.to_string(), shard(key));
    }
    config
}

fn submitted(server: &MockSecretStore) -> HashSet<String> {
    server.submitted_keys().into_iter().collect()
}

#[tokio::test]
async fn test_single_share_unseals_after_one_submission() {
    let config = static_config(&["a"], &[("s1", "k1")]);
    let server = MockSecretStore::sealed("a.example", 1);

    let status = run_unseal(&server, "a", &config.unseal_key_shards)
        .await
        .unwrap();

    assert!(!status.sealed);
    assert_eq!(server.submitted_keys(), vec!["k1".to_string()]);
}

#[tokio::test]
async fn test_never_unsealing_host_exhausts_shares() {
    let config = static_config(&["a"], &[("s1", "k1")]);
    let server = MockSecretStore::never_unseals("a.example");

    let err = assert_err!(run_unseal(&server, "a", &config.unseal_key_shards).await);

    assert!(matches!(err, MonitorError::SharesExhausted { ref host } if host == "a"));
    assert_eq!(server.submitted_keys().len(), 1);
}

#[tokio::test]
async fn test_every_eligible_share_tried_before_giving_up() {
    let config = static_config(
        &["a"],
        &[
            ("key-shard-a-0", "k0"),
            ("key-shard-a-1", "k1"),
            ("key-shard-a-2", "k2"),
            ("key-shard-a-recovery-0", "r0"),
        ],
    );
    let server = MockSecretStore::never_unseals("a.example");

    let err = assert_err!(run_unseal(&server, "a", &config.unseal_key_shards).await);

    assert!(matches!(err, MonitorError::SharesExhausted { .. }));
    let expected: HashSet<String> = ["k0", "k1", "k2"].iter().map(|k| k.to_string()).collect();
    assert_eq!(submitted(&server), expected);
}

#[tokio::test]
async fn test_unsealed_host_gets_no_shares() {
    let config = static_config(&["a"], &[("s1", "k1"), ("s2", "k2")]);
    let server = MockSecretStore::unsealed("a.example");

    let err = assert_err!(run_unseal(&server, "a", &config.unseal_key_shards).await);

    assert!(matches!(err, MonitorError::AlreadySealedPrecondition { .. }));
    assert!(server.submitted_keys().is_empty());
}

#[tokio::test]
async fn test_unreachable_host_does_not_block_others() {
    let down = MockSecretStore::sealed("a.example", 1);
    down.set_unreachable(true);
    let sealed = MockSecretStore::sealed("b.example", 2);
    let healthy = MockSecretStore::unsealed("c.example");

    let factory = FixedClientFactory::new()
        .with_client("a", down.clone())
        .with_client("b", sealed.clone())
        .with_client("c", healthy.clone());
    let mut monitor = Monitor::new(
        static_config(
            &["a", "b", "c"],
            &[("s1", "k1"), ("s2", "k2"), ("s1-recovery", "r1")],
        ),
        TopologyResolver::static_source(),
        Arc::new(factory),
    );

    let stats = monitor.run_cycle().await.unwrap();

    assert_eq!(stats.hosts_checked, 3);
    assert_eq!(stats.unreachable, 1);
    assert_eq!(stats.unseal_succeeded, 1);
    assert!(!stats.fleet_healthy());
    assert!(!sealed.is_sealed());
    assert!(healthy.health_calls() > 0);
    assert!(down.submitted_keys().is_empty());
    assert!(!submitted(&sealed).contains("r1"));
}

#[tokio::test]
async fn test_failed_host_retried_next_cycle() {
    let server = MockSecretStore::sealed("a.example", 1);
    server.set_fail_unseal(true);
    let mut monitor = Monitor::new(
        static_config(&["a"], &[("s1", "k1")]),
        TopologyResolver::static_source(),
        Arc::new(FixedClientFactory::new().with_client("a", server.clone())),
    );

    let first = monitor.run_cycle().await.unwrap();
    assert_eq!(first.unseal_failed, 1);
    assert!(server.is_sealed());

    server.set_fail_unseal(false);
    let second = monitor.run_cycle().await.unwrap();
    assert_eq!(second.unseal_succeeded, 1);
    assert!(!server.is_sealed());
}

fn key_secret(key: &str) -> Vec<u8> {
    format!(r#"{{"keys": ["{}"], "keys_base64": ["Chs="]}}"#, key).into_bytes()
}

fn platform_fleet() -> (MockPlatform, MonitorConfig) {
    let config = MonitorConfig::default();
    let platform = MockPlatform::new();
    platform.set_pods(
        config.namespace(),
        [
            ("stx-openbao-0", "10.0.0.10"),
            ("stx-openbao-1", "10.0.0.11"),
            ("stx-openbao-manager-0", "10.0.0.12"),
        ],
    );
    platform.add_secret(config.namespace(), "cluster-key-root", ROOT.as_bytes());
    platform.add_secret(config.namespace(), "cluster-key-0", &key_secret("k0"));
    platform.add_secret(config.namespace(), "cluster-key-recovery-0", &key_secret("r0"));
    (platform, config)
}

#[tokio::test]
async fn test_platform_refresh_replaces_address_book() {
    let (platform, config) = platform_fleet();
    let first = MockSecretStore::sealed("10-0-0-10", 1);
    let second = MockSecretStore::unsealed("10-0-0-11");
    let factory = FixedClientFactory::new()
        .with_client("stx-openbao-0", first.clone())
        .with_client("stx-openbao-1", second.clone());

    let mut ctx = CommandContext::new(
        config,
        TopologyResolver::platform(Arc::new(platform.clone())),
        Arc::new(factory),
    );
    ctx.refresh().await.unwrap();
    assert_eq!(ctx.config.root_token().unwrap().key, ROOT);
    assert_eq!(ctx.config.unseal_key_shards.len(), 2);

    let mut monitor = Monitor::new(ctx.config, ctx.resolver, ctx.factory);
    let stats = monitor.run_cycle().await.unwrap();
    assert_eq!(stats.hosts_checked, 2);
    assert!(!first.is_sealed());
    assert_eq!(first.submitted_keys(), vec!["k0".to_string()]);

    let names: Vec<&String> = monitor.config().server_addresses.keys().collect();
    assert_eq!(names, ["stx-openbao-0", "stx-openbao-1"]);
    assert_eq!(
        monitor.config().server_addresses["stx-openbao-0"].host,
        "10-0-0-10.openbao.pod.cluster.local"
    );

    platform.set_pods(monitor.config().namespace(), [("stx-openbao-1", "10.0.0.11")]);
    let stats = monitor.run_cycle().await.unwrap();

    assert_eq!(stats.hosts_checked, 1);
    let remaining: BTreeMap<_, _> = monitor.config().server_addresses.clone();
    assert_eq!(remaining.len(), 1);
    assert!(remaining.contains_key("stx-openbao-1"));
}

#[tokio::test]
async fn test_failed_refresh_keeps_prior_store() {
    let (platform, config) = platform_fleet();
    let factory = FixedClientFactory::new()
        .with_client("stx-openbao-0", MockSecretStore::unsealed("10-0-0-10"))
        .with_client("stx-openbao-1", MockSecretStore::unsealed("10-0-0-11"));

    let mut ctx = CommandContext::new(
        config,
        TopologyResolver::platform(Arc::new(platform.clone())),
        Arc::new(factory),
    );
    ctx.refresh().await.unwrap();
    let before = ctx.config.clone();

    // A malformed key secret fails the whole refresh
    platform.add_secret(before.namespace(), "cluster-key-1", br#"{"keys": []}"#);
    platform.set_pods(before.namespace(), [("stx-openbao-9", "10.0.0.19")]);
    let err = ctx.refresh().await.unwrap_err();
    assert!(matches!(err, MonitorError::ConfigInvalid(_)));
    assert_eq!(ctx.config, before);

    platform.set_unavailable(true);
    let mut monitor = Monitor::new(ctx.config, ctx.resolver, ctx.factory);
    let err = assert_err!(monitor.run_cycle().await);
    assert!(matches!(err, MonitorError::TopologyUnavailable(_)));
    assert!(err.is_fatal());
    assert_eq!(monitor.config(), &before);
}

/// Accepts connections and never answers
async fn silent_listener() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    port
}

#[tokio::test]
async fn test_silent_host_does_not_stall_cycle() {
    let silent_port = silent_listener().await;
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = closed.local_addr().unwrap().port();
    drop(closed);

    let mut config = static_config(&[], &[("s1", "k1")]);
    for (name, port) in [("a", silent_port), ("b", closed_port)] {
        config.server_addresses.insert(
            name.to_string(),
            ServerAddress {
                host: "127.0.0.1".to_string(),
                port,
            },
        );
    }
    config.timeout = 1;

    let mut monitor = Monitor::new(
        config,
        TopologyResolver::static_source(),
        Arc::new(HttpClientFactory::new()),
    );
    let stats = tokio::time::timeout(Duration::from_secs(20), monitor.run_cycle())
        .await
        .expect("cycle bounded by the request timeout")
        .unwrap();

    assert_eq!(stats.hosts_checked, 2);
    assert_eq!(stats.unreachable, 2);
}

#[test]
fn test_default_config_bounds_requests() {
    let config = static_config(&["a"], &[]);
    assert_eq!(config.timeout, 0);
    let settings = HttpClientFactory::settings(&config, "a").unwrap();
    assert_eq!(settings.timeout, Some(Duration::from_secs(60)));
}
