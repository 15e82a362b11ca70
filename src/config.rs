/*!
 * Configuration types for baomon
 *
 * `MonitorConfig` is both the persisted YAML file and the in-memory
 * credential/topology store the reconciliation loop works on.
 */

use bao_client::InitResponse;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{MonitorError, Result};
use crate::validate::{validate_config, ValidationPolicy};

pub const DEFAULT_PORT: u16 = 8200;
pub const DEFAULT_NAMESPACE: &str = "openbao";
pub const DEFAULT_POD_PREFIX: &str = "stx-openbao";
pub const DEFAULT_POD_ADDRESS_SUFFIX: &str = "pod.cluster.local";
pub const DEFAULT_SECRET_PREFIX: &str = "cluster-key";
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Token entry name used for the root token issued by `init`
pub const ROOT_TOKEN_NAME: &str = "root_token";

/// Marker in a shard name identifying a recovery share
pub const RECOVERY_MARKER: &str = "recovery";

/// Network location of one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddress {
    #[serde(default)]
    pub host: String,

    /// Zero means "use DefaultPort"
    #[serde(default)]
    pub port: u16,
}

impl ServerAddress {
    pub fn url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

/// Authentication token; a zero duration marks the root token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub duration: u64,

    #[serde(default)]
    pub key: String,
}

impl Token {
    pub fn root(key: impl Into<String>) -> Self {
        Self {
            duration: 0,
            key: key.into(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.duration == 0
    }
}

/// One share of the split master key (or a recovery share)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShard {
    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub key_base64: String,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

impl FromStr for LogLevel {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            // tracing has no level above ERROR
            "FATAL" => Ok(LogLevel::Error),
            other => Err(MonitorError::ConfigInvalid(format!(
                "the listed LogLevel {} is not a valid log level",
                other
            ))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Monitor configuration and credential store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Logical server name to network address
    #[serde(rename = "ServerAddresses", default, deserialize_with = "null_as_default")]
    pub server_addresses: BTreeMap<String, ServerAddress>,

    /// Release id to authentication token
    #[serde(rename = "Tokens", default, deserialize_with = "null_as_default")]
    pub tokens: BTreeMap<String, Token>,

    /// Shard name to key share
    #[serde(rename = "UnsealKeyShards", default, deserialize_with = "null_as_default")]
    pub unseal_key_shards: BTreeMap<String, KeyShard>,

    /// PEM CA bundle path; empty uses the system roots
    #[serde(rename = "CACert", default, deserialize_with = "null_as_default")]
    pub ca_cert: String,

    #[serde(rename = "ClientCert", default, deserialize_with = "null_as_default")]
    pub client_cert: String,

    #[serde(rename = "ClientKey", default, deserialize_with = "null_as_default")]
    pub client_key: String,

    /// Log file path; empty logs to stderr
    #[serde(rename = "logPath", default, deserialize_with = "null_as_default")]
    pub log_path: String,

    /// Symbolic (DEBUG, INFO, WARN, ERROR) or numeric log level
    #[serde(rename = "logLevel", default, deserialize_with = "null_as_default")]
    pub log_level: String,

    /// Seconds between reconciliation cycles; 0 defers to the command line
    #[serde(rename = "WaitInterval", default)]
    pub wait_interval: u64,

    /// Per-request timeout in seconds; negative uses the client default
    #[serde(rename = "Timeout", default)]
    pub timeout: i64,

    #[serde(rename = "Namespace", default, deserialize_with = "null_as_default")]
    pub namespace: String,

    #[serde(rename = "DefaultPort", default)]
    pub default_port: u16,

    #[serde(rename = "PodPrefix", default, deserialize_with = "null_as_default")]
    pub pod_prefix: String,

    #[serde(rename = "PodAddressSuffix", default, deserialize_with = "null_as_default")]
    pub pod_address_suffix: String,

    #[serde(rename = "SecretPrefix", default, deserialize_with = "null_as_default")]
    pub secret_prefix: String,

    /// Pull topology and secrets from Kubernetes instead of this file
    #[serde(rename = "UseK8sConfig", default)]
    pub use_k8s_config: bool,

    /// Use the in-cluster service account rather than a kubeconfig
    #[serde(rename = "UseInClusterConfig", default)]
    pub use_in_cluster_config: bool,
}

/// YAML `Key:` with no value deserializes to null; treat it like a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl MonitorConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_policy(path, &ValidationPolicy::default())
    }

    pub fn load_with_policy(path: impl AsRef<Path>, policy: &ValidationPolicy) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            MonitorError::ConfigInvalid(format!(
                "error in opening config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_reader(file, policy)
    }

    /// Parse YAML, fill defaults and run every structural check
    pub fn from_reader<R: Read>(mut reader: R, policy: &ValidationPolicy) -> Result<Self> {
        let mut data = String::new();
        reader.read_to_string(&mut data)?;
        Self::from_yaml_str(&data, policy)
    }

    pub fn from_yaml_str(data: &str, policy: &ValidationPolicy) -> Result<Self> {
        let mut config: MonitorConfig = if data.trim().is_empty() {
            MonitorConfig::default()
        } else {
            serde_yaml::from_str(data)?
        };

        config.apply_defaults();
        config.validate(policy)?;
        Ok(config)
    }

    /// Write the configuration as YAML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Writing configuration");
        let file = File::create(path)?;
        self.to_writer(file)
    }

    pub fn to_writer<W: Write>(&self, mut writer: W) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        writer.write_all(data.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Default port for the store, and for every address lacking one
    pub fn apply_defaults(&mut self) {
        if self.default_port == 0 {
            self.default_port = DEFAULT_PORT;
        }

        let default_port = self.default_port;
        for address in self.server_addresses.values_mut() {
            if address.port == 0 {
                address.port = default_port;
            }
        }
    }

    pub fn validate(&self, policy: &ValidationPolicy) -> Result<()> {
        validate_config(self, policy)
    }

    /// Effective log level; unset means INFO
    pub fn interpret_log_level(&self, policy: &ValidationPolicy) -> Result<LogLevel> {
        Ok(policy.parse_log_level(&self.log_level)?.unwrap_or_default())
    }

    /// The token with zero duration, if one is configured
    pub fn root_token(&self) -> Option<&Token> {
        self.tokens.values().find(|token| token.is_root())
    }

    /// Record the root token and key shares issued by initializing `host`.
    ///
    /// Nothing is written if any of the new entries already exists.
    pub fn parse_init_response(&mut self, host: &str, response: &InitResponse) -> Result<()> {
        debug!(host = %host, "Parsing init response into the configuration");

        if self.tokens.contains_key(ROOT_TOKEN_NAME) {
            return Err(MonitorError::ConfigInvalid(
                "an entry of the root token was already found".to_string(),
            ));
        }

        if response.keys.len() != response.keys_base64.len()
            || response.recovery_keys.len() != response.recovery_keys_base64.len()
        {
            return Err(MonitorError::ConfigInvalid(
                "init response has mismatched key and base64 key lists".to_string(),
            ));
        }

        let header = format!("key-shard-{}", host);
        let unseal = response
            .keys
            .iter()
            .zip(&response.keys_base64)
            .enumerate()
            .map(|(i, (key, b64))| (format!("{}-{}", header, i), key, b64));
        let recovery = response
            .recovery_keys
            .iter()
            .zip(&response.recovery_keys_base64)
            .enumerate()
            .map(|(i, (key, b64))| (format!("{}-{}-{}", header, RECOVERY_MARKER, i), key, b64));

        let mut staged = BTreeMap::new();
        for (name, key, key_base64) in unseal.chain(recovery) {
            if self.unseal_key_shards.contains_key(&name) {
                return Err(MonitorError::ConfigInvalid(format!(
                    "an entry of {} was already found under UnsealKeyShards",
                    name
                )));
            }
            staged.insert(
                name,
                KeyShard {
                    key: key.clone(),
                    key_base64: key_base64.clone(),
                },
            );
        }

        self.tokens
            .insert(ROOT_TOKEN_NAME.to_string(), Token::root(&response.root_token));
        self.unseal_key_shards.extend(staged);
        Ok(())
    }

    pub fn namespace(&self) -> &str {
        non_empty_or(&self.namespace, DEFAULT_NAMESPACE)
    }

    pub fn pod_prefix(&self) -> &str {
        non_empty_or(&self.pod_prefix, DEFAULT_POD_PREFIX)
    }

    pub fn pod_address_suffix(&self) -> &str {
        non_empty_or(&self.pod_address_suffix, DEFAULT_POD_ADDRESS_SUFFIX)
    }

    pub fn secret_prefix(&self) -> &str {
        non_empty_or(&self.secret_prefix, DEFAULT_SECRET_PREFIX)
    }

    pub fn port(&self) -> u16 {
        if self.default_port == 0 {
            DEFAULT_PORT
        } else {
            self.default_port
        }
    }

    /// Delay between cycles: the file wins when set, then the flag, then 5s
    pub fn wait_interval(&self, flag_seconds: Option<u64>) -> Duration {
        if self.wait_interval > 0 {
            return Duration::from_secs(self.wait_interval);
        }
        match flag_seconds {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_WAIT_INTERVAL,
        }
    }

    /// Per-request timeout. Zero or negative (including an absent
    /// `Timeout` key) means the 60s client default; every request stays bounded.
    pub fn request_timeout(&self) -> Duration {
        if self.timeout > 0 {
            Duration::from_secs(self.timeout as u64)
        } else {
            DEFAULT_REQUEST_TIMEOUT
        }
    }
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}
