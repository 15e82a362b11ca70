/*!
 * Health prober
 */

use bao_client::{HealthResponse, SecretStore};
use tracing::debug;

use crate::error::{MonitorError, Result};

/// One health query against `client`; errors carry the host name and are
/// not retried here
pub async fn check_health(client: &dyn SecretStore, host: &str) -> Result<HealthResponse> {
    let health = client.health().await.map_err(|source| {
        if source.is_connection_error() {
            debug!(host = %host, "Server did not answer the health query");
        }
        MonitorError::HostUnreachable {
            host: host.to_string(),
            source,
        }
    })?;

    debug!(
        host = %host,
        initialized = health.initialized,
        sealed = health.sealed,
        threshold = health.t,
        progress = health.progress,
        "Health status"
    );
    Ok(health)
}
