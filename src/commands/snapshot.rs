/*!
 * `snapshot precheck|create|restore`
 */

use std::path::Path;
use tokio::fs::File;
use tracing::info;

use super::CommandContext;
use crate::error::{MonitorError, Result};
use crate::health::check_health;

/// Every known server must be reachable and unsealed before a snapshot
pub async fn precheck(ctx: &CommandContext) -> Result<()> {
    for host in ctx.config.server_addresses.keys() {
        let client = ctx.client(host)?;
        let health = check_health(client.as_ref(), host).await?;
        if health.sealed {
            return Err(MonitorError::HostSealed { host: host.clone() });
        }
    }

    info!(servers = ctx.config.server_addresses.len(), "Snapshot precheck successful");
    Ok(())
}

/// Stream a raft snapshot of `host` into `path`; returns the byte count
pub async fn create(ctx: &CommandContext, host: &str, path: &Path) -> Result<u64> {
    let client = ctx.client(host)?;
    let mut file = File::create(path).await?;

    let written = client
        .raft_snapshot(&mut file)
        .await
        .map_err(|source| MonitorError::Api {
            host: host.to_string(),
            operation: "snapshot create",
            source,
        })?;

    file.sync_all().await?;
    info!(host = %host, path = %path.display(), bytes = written, "Snapshot create successful");
    Ok(written)
}

pub async fn restore(ctx: &CommandContext, host: &str, path: &Path, force: bool) -> Result<()> {
    let client = ctx.client(host)?;
    let snapshot = tokio::fs::read(path).await?;

    client
        .raft_snapshot_restore(snapshot, force)
        .await
        .map_err(|source| MonitorError::Api {
            host: host.to_string(),
            operation: "snapshot restore",
            source,
        })?;

    info!(host = %host, path = %path.display(), force, "Snapshot restore successful");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FixedClientFactory;
    use crate::config::{MonitorConfig, ServerAddress};
    use crate::topology::TopologyResolver;
    use bao_client::MockSecretStore;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn context(servers: &[(&str, MockSecretStore)]) -> CommandContext {
        let mut config = MonitorConfig::default();
        let mut factory = FixedClientFactory::new();
        for (name, server) in servers {
            config.server_addresses.insert(
                name.to_string(),
                ServerAddress {
                    host: format!("{}.example", name),
                    port: 8200,
                },
            );
            factory = factory.with_client(*name, server.clone());
        }
        CommandContext::new(config, TopologyResolver::static_source(), Arc::new(factory))
    }

    #[tokio::test]
    async fn test_precheck_requires_all_unsealed() {
        let ctx = context(&[
            ("a", MockSecretStore::unsealed("a")),
            ("b", MockSecretStore::unsealed("b")),
        ]);
        assert!(precheck(&ctx).await.is_ok());

        let ctx = context(&[
            ("a", MockSecretStore::unsealed("a")),
            ("b", MockSecretStore::sealed("b", 1)),
        ]);
        let err = precheck(&ctx).await.unwrap_err();
        assert!(matches!(err, MonitorError::HostSealed { ref host } if host == "b"));
    }

    #[tokio::test]
    async fn test_create_and_restore() {
        let server = MockSecretStore::unsealed("a");
        server.set_snapshot(b"raft snapshot bytes");
        let ctx = context(&[("a", server.clone())]);
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.snap");

        let written = create(&ctx, "a", &path).await.unwrap();
        assert_eq!(written, 19);
        assert_eq!(std::fs::read(&path).unwrap(), b"raft snapshot bytes");

        restore(&ctx, "a", &path, true).await.unwrap();
        assert_eq!(
            server.restored_snapshot(),
            Some((b"raft snapshot bytes".to_vec(), true))
        );
    }

    #[tokio::test]
    async fn test_restore_missing_file() {
        let ctx = context(&[("a", MockSecretStore::unsealed("a"))]);
        let err = restore(&ctx, "a", Path::new("/nonexistent/backup.snap"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Io(_)));
    }
}
