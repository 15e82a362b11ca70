/*!
 * Integration tests for loading, validating and persisting the store
 */

use baomon::{config::MonitorConfig, error::MonitorError, LogLevel, ValidationPolicy};
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

const ROOT: &str = "s.abcdefghijklmnopqrstuvwx";
const OTHER: &str = "s.ABCDEFGHIJKLMNOPQRSTUVWX";

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn assert_config_invalid(contents: &str) {
    let file = write_config(contents);
    match MonitorConfig::load(file.path()) {
        Err(MonitorError::ConfigInvalid(_)) => {}
        other => panic!("expected ConfigInvalid, got {:?}", other),
    }
}

#[test]
fn test_two_root_tokens_rejected() {
    assert_config_invalid(&format!(
        "Tokens:\n  first:\n    duration: 0\n    key: {}\n  second:\n    duration: 0\n    key: {}\n",
        ROOT, OTHER
    ));
}

#[test]
fn test_expiring_tokens_alongside_root_accepted() {
    let file = write_config(&format!(
        "Tokens:\n  root_token:\n    duration: 0\n    key: {}\n  reader:\n    duration: 3600\n    key: {}\n",
        ROOT, OTHER
    ));
    let config = MonitorConfig::load(file.path()).unwrap();
    assert_eq!(config.root_token().unwrap().key, ROOT);
}

#[test]
fn test_bad_base64_shard_rejected() {
    assert_config_invalid(
        "UnsealKeyShards:\n  s1:\n    key: 0a1b2c\n    key_base64: \"not base64!!\"\n",
    );
}

#[test]
fn test_empty_host_rejected() {
    assert_config_invalid("ServerAddresses:\n  a:\n    host: \"\"\n    port: 8200\n");

    let err = MonitorConfig::from_yaml_str(
        "ServerAddresses:\n  a:\n    host: \"\"\n",
        &ValidationPolicy::default(),
    )
    .unwrap_err();
    assert!(matches!(err, MonitorError::ConfigInvalid(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_numeric_log_levels() {
    let file = write_config("logLevel: \"5\"\n");
    let config = MonitorConfig::load(file.path()).unwrap();
    let level = config
        .interpret_log_level(&ValidationPolicy::default())
        .unwrap();
    assert_eq!(level, LogLevel::Error);

    assert_config_invalid("logLevel: \"9\"\n");
}

#[test]
fn test_overridden_policy() {
    let data = "logLevel: \"9\"\nTokens:\n  t:\n    duration: 60\n    key: custom-token\n";

    let policy = ValidationPolicy::default()
        .with_numeric_log_level(9, LogLevel::Debug)
        .with_token_pattern(r"^custom-[a-z]+$")
        .unwrap();
    let config = MonitorConfig::from_yaml_str(data, &policy).unwrap();
    assert_eq!(config.interpret_log_level(&policy).unwrap(), LogLevel::Debug);

    assert!(MonitorConfig::from_yaml_str(data, &ValidationPolicy::default()).is_err());
}

#[test]
fn test_save_and_reload_keeps_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    let file = write_config(&format!(
        "ServerAddresses:\n  a:\n    host: a.example\nTokens:\n  root_token:\n    duration: 0\n    key: {}\nUnsealKeyShards:\n  s1:\n    key: 0a1b\n    key_base64: Chs=\n  s1-recovery:\n    key: 0c0d\n    key_base64: DA0=\nlogLevel: DEBUG\n",
        ROOT
    ));

    let config = MonitorConfig::load(file.path()).unwrap();
    config.save(&path).unwrap();
    let reloaded = MonitorConfig::load(&path).unwrap();

    assert_eq!(reloaded, config);
    assert_eq!(reloaded.server_addresses["a"].port, 8200);
    assert_eq!(reloaded.unseal_key_shards.len(), 2);
    assert_eq!(reloaded.log_level, "DEBUG");
}

#[test]
fn test_missing_file_is_config_invalid() {
    let err = MonitorConfig::load("/nonexistent/baomon/config.yaml").unwrap_err();
    assert!(matches!(err, MonitorError::ConfigInvalid(_)));
}
