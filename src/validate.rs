/*!
 * Structural validation for the monitor configuration
 *
 * Every load and every platform refresh runs these checks. The token shape
 * and the numeric log-level table are policy, so they live in
 * `ValidationPolicy` where callers can replace them.
 */

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use crate::config::{KeyShard, LogLevel, MonitorConfig, ServerAddress, Token};
use crate::error::{MonitorError, Result};

/// Token type tag (service, batch, recovery), a dot, then a 24+ character body
pub const DEFAULT_TOKEN_PATTERN: &str = r"^[sbr][.][a-zA-Z0-9]{24,}$";

static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_TOKEN_PATTERN).unwrap());

/// Numeric log levels as used by the helm chart; 4 and 5 both mean ERROR
pub const DEFAULT_NUMERIC_LOG_LEVELS: [(u32, LogLevel); 5] = [
    (1, LogLevel::Debug),
    (2, LogLevel::Info),
    (3, LogLevel::Warn),
    (4, LogLevel::Error),
    (5, LogLevel::Error),
];

/// Overridable validation rules
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    token_pattern: Regex,
    numeric_log_levels: BTreeMap<u32, LogLevel>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            token_pattern: TOKEN_REGEX.clone(),
            numeric_log_levels: DEFAULT_NUMERIC_LOG_LEVELS.into_iter().collect(),
        }
    }
}

impl ValidationPolicy {
    /// Replace the token shape
    pub fn with_token_pattern(mut self, pattern: &str) -> Result<Self> {
        self.token_pattern = Regex::new(pattern).map_err(|e| {
            MonitorError::ConfigInvalid(format!("invalid token pattern {}: {}", pattern, e))
        })?;
        Ok(self)
    }

    /// Add or replace one numeric log-level code
    pub fn with_numeric_log_level(mut self, code: u32, level: LogLevel) -> Self {
        self.numeric_log_levels.insert(code, level);
        self
    }

    pub fn token_matches(&self, key: &str) -> bool {
        self.token_pattern.is_match(key)
    }

    /// Interpret a configured log level.
    ///
    /// Empty means "not set". Numbers go through the numeric table; anything
    /// else must be one of the symbolic names.
    pub fn parse_log_level(&self, raw: &str) -> Result<Option<LogLevel>> {
        if raw.is_empty() {
            return Ok(None);
        }

        if let Ok(code) = raw.parse::<u32>() {
            return self
                .numeric_log_levels
                .get(&code)
                .copied()
                .map(Some)
                .ok_or_else(|| {
                    MonitorError::ConfigInvalid(format!(
                        "the numeric LogLevel {} is not a valid log level",
                        raw
                    ))
                });
        }

        raw.parse::<LogLevel>().map(Some).map_err(|_| {
            MonitorError::ConfigInvalid(format!(
                "the listed LogLevel {} is not a valid log level",
                raw
            ))
        })
    }
}

/// Run every structural check against `config`
pub fn validate_config(config: &MonitorConfig, policy: &ValidationPolicy) -> Result<()> {
    validate_addresses(&config.server_addresses)?;
    validate_tokens(&config.tokens, policy)?;
    validate_key_shards(&config.unseal_key_shards)?;
    validate_ca_cert(&config.ca_cert)?;
    validate_log_config(&config.log_path, &config.log_level, policy)?;
    Ok(())
}

/// Every server address needs a host; ports are always filled by defaults
pub fn validate_addresses(addresses: &BTreeMap<String, ServerAddress>) -> Result<()> {
    for (name, address) in addresses {
        if address.host.is_empty() {
            return Err(MonitorError::ConfigInvalid(format!(
                "the domain entry {} in ServerAddresses is invalid",
                name
            )));
        }
    }
    Ok(())
}

/// At most one root token, and every key must have the token shape
pub fn validate_tokens(tokens: &BTreeMap<String, Token>, policy: &ValidationPolicy) -> Result<()> {
    let mut root_seen = false;
    for (release_id, token) in tokens {
        if token.is_root() {
            if root_seen {
                return Err(MonitorError::ConfigInvalid(
                    "there are two or more root tokens listed".to_string(),
                ));
            }
            root_seen = true;
        }

        if !policy.token_matches(&token.key) {
            return Err(MonitorError::ConfigInvalid(format!(
                "the token with release id {} has wrong key format",
                release_id
            )));
        }
    }
    Ok(())
}

/// Shards need both forms of the key, and the base64 form must decode
pub fn validate_key_shards(shards: &BTreeMap<String, KeyShard>) -> Result<()> {
    for (name, shard) in shards {
        if shard.key.is_empty() || shard.key_base64.is_empty() {
            return Err(MonitorError::ConfigInvalid(format!(
                "shard {} has missing keys",
                name
            )));
        }

        STANDARD.decode(&shard.key_base64).map_err(|e| {
            MonitorError::ConfigInvalid(format!(
                "shard {} does not have a valid base64 encoded key: {}",
                name, e
            ))
        })?;
    }
    Ok(())
}

pub fn validate_ca_cert(ca_cert: &str) -> Result<()> {
    if !ca_cert.is_empty() && !Path::new(ca_cert).exists() {
        return Err(MonitorError::ConfigInvalid(format!(
            "the CACert path {} does not exist",
            ca_cert
        )));
    }
    Ok(())
}

pub fn validate_log_config(log_path: &str, log_level: &str, policy: &ValidationPolicy) -> Result<()> {
    if !log_path.is_empty() {
        let parent = match Path::new(log_path).parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !parent.is_dir() {
            return Err(MonitorError::ConfigInvalid(format!(
                "the parent directory of logPath {} does not exist",
                log_path
            )));
        }
    }

    policy.parse_log_level(log_level)?;
    Ok(())
}
