/*!
 * One-shot administrative commands
 *
 * Each command is a single validated exchange with one server (or one pass
 * over the fleet for the snapshot precheck). They share a `CommandContext`
 * holding the loaded store and the client factory.
 */

pub mod dump_config;
pub mod health;
pub mod init;
pub mod raft;
pub mod snapshot;
pub mod unseal;

use bao_client::SecretStore;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::client::ClientFactory;
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::topology::TopologyResolver;

/// Everything a command needs, built once per invocation
pub struct CommandContext {
    pub config: MonitorConfig,
    pub resolver: TopologyResolver,
    pub factory: Arc<dyn ClientFactory>,
}

impl CommandContext {
    pub fn new(
        config: MonitorConfig,
        resolver: TopologyResolver,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            config,
            resolver,
            factory,
        }
    }

    /// Pull addresses and credentials from the platform, if platform sourced
    pub async fn refresh(&mut self) -> Result<()> {
        self.resolver.refresh_all(&mut self.config).await
    }

    pub fn client(&self, name: &str) -> Result<Arc<dyn SecretStore>> {
        self.factory.build(&self.config, name)
    }

    /// Persist the store back to `path` in static mode. A platform-sourced
    /// store is a derived view and is never written.
    pub fn finish(&self, path: &Path) -> Result<bool> {
        if self.resolver.is_platform_sourced() {
            debug!("Platform sourced configuration, not writing it back");
            return Ok(false);
        }
        self.config.save(path)?;
        Ok(true)
    }
}
