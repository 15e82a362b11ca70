/*!
 * Client factory
 *
 * Turns a logical server name into a ready `SecretStore` using the
 * address book and TLS/timeout settings of the current configuration.
 */

use bao_client::{ClientSettings, HttpSecretStore, SecretStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};

pub trait ClientFactory: Send + Sync {
    /// Build a client for the server registered as `name`
    fn build(&self, config: &MonitorConfig, name: &str) -> Result<Arc<dyn SecretStore>>;
}

/// Builds HTTPS clients; attaches the root token when one is configured
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory;

impl HttpClientFactory {
    pub fn new() -> Self {
        Self
    }

    /// Connection settings for `name`
    pub fn settings(config: &MonitorConfig, name: &str) -> Result<ClientSettings> {
        let address = config
            .server_addresses
            .get(name)
            .ok_or_else(|| MonitorError::NotFound(name.to_string()))?;

        Ok(ClientSettings {
            address: address.url(),
            ca_cert: optional_path(&config.ca_cert),
            client_cert: optional_path(&config.client_cert),
            client_key: optional_path(&config.client_key),
            timeout: Some(config.request_timeout()),
            token: config.root_token().map(|token| token.key.clone()),
        })
    }
}

impl ClientFactory for HttpClientFactory {
    fn build(&self, config: &MonitorConfig, name: &str) -> Result<Arc<dyn SecretStore>> {
        let settings = Self::settings(config, name)?;
        debug!(host = %name, address = %settings.address, "Setting up client");

        let client = HttpSecretStore::new(settings).map_err(|e| {
            MonitorError::ClientConstructionFailed {
                host: name.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Arc::new(client))
    }
}

/// Hands out pre-built clients by name
#[derive(Clone, Default)]
pub struct FixedClientFactory {
    clients: HashMap<String, Arc<dyn SecretStore>>,
}

impl FixedClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, name: impl Into<String>, client: impl SecretStore) -> Self {
        self.clients.insert(name.into(), Arc::new(client));
        self
    }
}

impl ClientFactory for FixedClientFactory {
    fn build(&self, config: &MonitorConfig, name: &str) -> Result<Arc<dyn SecretStore>> {
        if !config.server_addresses.contains_key(name) {
            return Err(MonitorError::NotFound(name.to_string()));
        }
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| MonitorError::ClientConstructionFailed {
                host: name.to_string(),
                reason: "no client registered".to_string(),
            })
    }
}

fn optional_path(path: &str) -> Option<PathBuf> {
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}
