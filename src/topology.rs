/*!
 * Topology resolver
 *
 * In static mode the address book, tokens and key shards are whatever the
 * configuration file holds. In platform mode they are rebuilt from the
 * orchestration platform: server pods become addresses, prefixed secrets
 * become the root token and key shards.
 *
 * Every refresh is staged: the new maps are built and validated on the side
 * and only swapped into the store once they pass. A failed refresh leaves the
 * previous maps untouched.
 */

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{KeyShard, MonitorConfig, ServerAddress, Token};
use crate::error::{MonitorError, Result};
use crate::platform::{Platform, PodInfo, SecretInfo};
use crate::validate::{validate_addresses, validate_key_shards, validate_tokens, ValidationPolicy};

/// Secret data key holding the payload
pub const SECRET_DATA_KEY: &str = "strdata";

/// Secret name suffix marking a root token payload
pub const ROOT_SECRET_SUFFIX: &str = "root";

/// JSON payload of a key-shard secret
#[derive(Debug, Deserialize)]
struct KeySecret {
    keys: Vec<String>,
    keys_base64: Vec<String>,
}

/// Tokens and key shards pulled from the platform
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub tokens: BTreeMap<String, Token>,
    pub key_shards: BTreeMap<String, KeyShard>,
}

#[derive(Clone)]
pub enum TopologySource {
    /// Use the configuration as loaded
    Static,
    /// Rebuild topology and credentials from the platform
    Platform(Arc<dyn Platform>),
}

impl std::fmt::Debug for TopologySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologySource::Static => write!(f, "Static"),
            TopologySource::Platform(_) => write!(f, "Platform"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopologyResolver {
    source: TopologySource,
    policy: ValidationPolicy,
}

impl TopologyResolver {
    pub fn new(source: TopologySource, policy: ValidationPolicy) -> Self {
        Self { source, policy }
    }

    pub fn static_source() -> Self {
        Self::new(TopologySource::Static, ValidationPolicy::default())
    }

    pub fn platform(platform: Arc<dyn Platform>) -> Self {
        Self::new(TopologySource::Platform(platform), ValidationPolicy::default())
    }

    /// True when the store is derived from the platform and must not be
    /// written back to the configuration file
    pub fn is_platform_sourced(&self) -> bool {
        matches!(self.source, TopologySource::Platform(_))
    }

    /// Replace the address book from the platform's pod listing
    pub async fn refresh_addresses(&self, config: &mut MonitorConfig) -> Result<()> {
        let TopologySource::Platform(ref platform) = self.source else {
            return Ok(());
        };

        let staged = self.stage_addresses(platform.as_ref(), config).await?;
        info!(servers = staged.len(), "Server addresses refreshed from platform");
        config.server_addresses = staged;
        Ok(())
    }

    /// Replace tokens and key shards from the platform's secrets
    pub async fn refresh_secrets(&self, config: &mut MonitorConfig) -> Result<()> {
        let TopologySource::Platform(ref platform) = self.source else {
            return Ok(());
        };

        let staged = self.stage_credentials(platform.as_ref(), config).await?;
        info!(
            tokens = staged.tokens.len(),
            shards = staged.key_shards.len(),
            "Root token and key shards refreshed from platform"
        );
        config.tokens = staged.tokens;
        config.unseal_key_shards = staged.key_shards;
        Ok(())
    }

    /// Refresh addresses and credentials; either both are replaced or neither
    pub async fn refresh_all(&self, config: &mut MonitorConfig) -> Result<()> {
        let TopologySource::Platform(ref platform) = self.source else {
            return Ok(());
        };

        let addresses = self.stage_addresses(platform.as_ref(), config).await?;
        let credentials = self.stage_credentials(platform.as_ref(), config).await?;

        config.server_addresses = addresses;
        config.tokens = credentials.tokens;
        config.unseal_key_shards = credentials.key_shards;
        Ok(())
    }

    async fn stage_addresses(
        &self,
        platform: &dyn Platform,
        config: &MonitorConfig,
    ) -> Result<BTreeMap<String, ServerAddress>> {
        debug!(namespace = %config.namespace(), "Listing server pods");
        let pods = platform
            .list_pods(config.namespace())
            .await
            .map_err(|e| MonitorError::TopologyUnavailable(e.to_string()))?;

        let staged = addresses_from_pods(&pods, config)?;
        validate_addresses(&staged)?;
        Ok(staged)
    }

    async fn stage_credentials(
        &self,
        platform: &dyn Platform,
        config: &MonitorConfig,
    ) -> Result<Credentials> {
        debug!(namespace = %config.namespace(), "Listing secrets");
        let secrets = platform
            .list_secrets(config.namespace())
            .await
            .map_err(|e| MonitorError::TopologyUnavailable(e.to_string()))?;

        let staged = credentials_from_secrets(&secrets, config.secret_prefix())?;
        validate_tokens(&staged.tokens, &self.policy)?;
        validate_key_shards(&staged.key_shards)?;
        Ok(staged)
    }
}

/// Map `<prefix>-<digit>` pods to `<ip-with-dashes>.<namespace>.<suffix>`
pub fn addresses_from_pods(
    pods: &[PodInfo],
    config: &MonitorConfig,
) -> Result<BTreeMap<String, ServerAddress>> {
    let pattern = format!(r"^{}-\d$", regex::escape(config.pod_prefix()));
    let matcher = Regex::new(&pattern).map_err(|e| {
        MonitorError::ConfigInvalid(format!("invalid pod prefix {}: {}", config.pod_prefix(), e))
    })?;

    let mut addresses = BTreeMap::new();
    for pod in pods.iter().filter(|pod| matcher.is_match(&pod.name)) {
        if pod.pod_ip.is_empty() {
            warn!(pod = %pod.name, "Server pod has no IP yet, skipping");
            continue;
        }

        let host = format!(
            "{}.{}.{}",
            pod.pod_ip.replace('.', "-"),
            config.namespace(),
            config.pod_address_suffix()
        );
        addresses.insert(
            pod.name.clone(),
            ServerAddress {
                host,
                port: config.port(),
            },
        );
    }

    Ok(addresses)
}

/// Decode prefixed secrets into a root token and key shards
pub fn credentials_from_secrets(secrets: &[SecretInfo], prefix: &str) -> Result<Credentials> {
    let mut credentials = Credentials::default();

    for secret in secrets.iter().filter(|s| s.name.starts_with(prefix)) {
        let payload = secret.data.get(SECRET_DATA_KEY).ok_or_else(|| {
            MonitorError::ConfigInvalid(format!(
                "secret {} has no {} entry",
                secret.name, SECRET_DATA_KEY
            ))
        })?;

        if secret.name.ends_with(ROOT_SECRET_SUFFIX) {
            let key = std::str::from_utf8(payload).map_err(|_| {
                MonitorError::ConfigInvalid(format!(
                    "secret {} does not hold a UTF-8 token",
                    secret.name
                ))
            })?;
            credentials
                .tokens
                .insert(secret.name.clone(), Token::root(key.trim()));
        } else {
            credentials
                .key_shards
                .insert(secret.name.clone(), decode_key_secret(&secret.name, payload)?);
        }
    }

    Ok(credentials)
}

fn decode_key_secret(name: &str, payload: &[u8]) -> Result<KeyShard> {
    let secret: KeySecret = serde_json::from_slice(payload).map_err(|e| {
        if e.is_syntax() || e.is_eof() {
            MonitorError::TopologyUnavailable(format!("secret {} is not valid JSON: {}", name, e))
        } else {
            MonitorError::ConfigInvalid(format!("secret {} has an unexpected shape: {}", name, e))
        }
    })?;

    match (secret.keys.first(), secret.keys_base64.first()) {
        (Some(key), Some(key_base64)) => Ok(KeyShard {
            key: key.clone(),
            key_base64: key_base64.clone(),
        }),
        _ => Err(MonitorError::ConfigInvalid(format!(
            "secret {} holds no key shard",
            name
        ))),
    }
}
