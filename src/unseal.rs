/*!
 * Unseal reconciler
 *
 * Feeds non-recovery key shares to a sealed server until it reports itself
 * unsealed. Shares issued for any member of a raft cluster unseal every
 * member, so shares are not filtered by the host named in their key.
 */

use bao_client::{SealStatusResponse, SecretStore};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{KeyShard, RECOVERY_MARKER};
use crate::error::{MonitorError, Result};
use crate::health::check_health;

/// Shares eligible for a routine unseal
pub fn unseal_shares(shards: &BTreeMap<String, KeyShard>) -> impl Iterator<Item = (&str, &KeyShard)> {
    shards
        .iter()
        .filter(|(name, _)| !name.contains(RECOVERY_MARKER))
        .map(|(name, shard)| (name.as_str(), shard))
}

/// Unseal `host`.
///
/// Fails with `AlreadySealedPrecondition` if the host is not sealed to begin
/// with, `SubmissionFailed` on the first failing unseal call, and
/// `SharesExhausted` if every eligible share was accepted but the host is
/// still sealed.
pub async fn run_unseal(
    client: &dyn SecretStore,
    host: &str,
    shards: &BTreeMap<String, KeyShard>,
) -> Result<SealStatusResponse> {
    debug!(host = %host, "Checking if the server is already unsealed");
    let health = check_health(client, host).await?;
    if !health.sealed {
        return Err(MonitorError::AlreadySealedPrecondition {
            host: host.to_string(),
        });
    }

    for (attempt, (name, shard)) in unseal_shares(shards).enumerate() {
        debug!(host = %host, attempt = attempt + 1, shard = %name, "Unseal attempt");

        let status = client
            .unseal(&shard.key)
            .await
            .map_err(|source| MonitorError::SubmissionFailed {
                host: host.to_string(),
                source,
            })?;

        if !status.sealed {
            info!(host = %host, attempts = attempt + 1, "Unseal complete");
            return Ok(status);
        }

        debug!(
            host = %host,
            threshold = status.t,
            progress = status.progress,
            "Server still sealed"
        );
    }

    Err(MonitorError::SharesExhausted {
        host: host.to_string(),
    })
}
