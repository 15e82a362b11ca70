//! Reconciliation loop
//!
//! Each cycle refreshes topology (platform mode only), builds a client per
//! server, probes every server and unseals the sealed ones, then sleeps.
//! Topology and client construction failures end the loop; a failing server
//! is logged and skipped until the next cycle.

use async_trait::async_trait;
use bao_client::SecretStore;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::ClientFactory;
use crate::config::{MonitorConfig, DEFAULT_WAIT_INTERVAL};
use crate::error::Result;
use crate::health::check_health;
use crate::stats::{CycleStats, CycleStatsBuilder};
use crate::topology::TopologyResolver;
use crate::unseal::run_unseal;

/// Source of delays between cycles
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time via the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Cancel `cancel` on Ctrl-C or SIGTERM (how Kubernetes stops a pod).
///
/// The SIGTERM handler is installed before this returns.
pub fn cancel_on_shutdown(cancel: CancellationToken) -> JoinHandle<()> {
    let terminate = terminate_signal();
    tokio::spawn(async move {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = interrupt => info!("Interrupt received, stopping after the current cycle"),
            _ = terminate => info!("Terminate signal received, stopping after the current cycle"),
        }
        cancel.cancel();
    })
}

#[cfg(unix)]
fn terminate_signal() -> impl Future<Output = ()> + Send + 'static {
    use tokio::signal::unix::{signal, SignalKind};

    let sigterm = signal(SignalKind::terminate());
    async move {
        match sigterm {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
fn terminate_signal() -> impl Future<Output = ()> + Send + 'static {
    std::future::pending::<()>()
}

/// Keeps every known server unsealed
pub struct Monitor {
    config: MonitorConfig,
    resolver: TopologyResolver,
    factory: Arc<dyn ClientFactory>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        resolver: TopologyResolver,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            config,
            resolver,
            factory,
            clock: Arc::new(TokioClock),
            interval: DEFAULT_WAIT_INTERVAL,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn into_config(self) -> MonitorConfig {
        self.config
    }

    /// Run cycles until `cancel` fires or a fleet-wide error occurs.
    ///
    /// Cancellation interrupts the sleep between cycles; a cycle that has
    /// started runs to completion.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            "🛡️  Monitor active | Servers: {} | Interval: {}s | Platform sourced: {}",
            self.config.server_addresses.len(),
            self.interval.as_secs(),
            self.resolver.is_platform_sourced()
        );

        while !cancel.is_cancelled() {
            self.run_cycle().await?;

            debug!(
                "Unseal check complete, waiting {}s until the next check",
                self.interval.as_secs()
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.clock.sleep(self.interval) => {}
            }
        }

        info!("Monitor stopped");
        Ok(())
    }

    /// One reconciliation pass over the fleet
    ///
    /// Note: Public for integration testing
    pub async fn run_cycle(&mut self) -> Result<CycleStats> {
        self.resolver.refresh_addresses(&mut self.config).await?;

        let mut clients: BTreeMap<String, Arc<dyn SecretStore>> = BTreeMap::new();
        for name in self.config.server_addresses.keys() {
            debug!(host = %name, "Creating client");
            clients.insert(name.clone(), self.factory.build(&self.config, name)?);
        }

        let mut stats = CycleStatsBuilder::new();

        for (host, client) in &clients {
            let health = match check_health(client.as_ref(), host).await {
                Ok(health) => health,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(host = %host, category = %e.category(), "{}", e);
                    stats.record_unreachable();
                    continue;
                }
            };

            if !health.sealed {
                debug!(host = %host, "Server is unsealed");
                stats.record_unsealed();
                continue;
            }

            stats.record_sealed();
            info!(host = %host, "Server is sealed, attempting to unseal");

            match run_unseal(client.as_ref(), host, &self.config.unseal_key_shards).await {
                Ok(_) => {
                    info!(host = %host, "✅ Unseal successful");
                    stats.record_unseal_success();
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(host = %host, category = %e.category(), "{}", e);
                    stats.record_unseal_failure();
                }
            }
        }

        let stats = stats.finish();
        if stats.fleet_healthy() {
            debug!("{}", stats.summary());
        } else {
            warn!("{}", stats.summary());
        }
        Ok(stats)
    }
}
