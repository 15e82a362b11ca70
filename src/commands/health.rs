//! `health HOST`

use bao_client::HealthResponse;
use tracing::info;

use super::CommandContext;
use crate::error::Result;
use crate::health::check_health;

pub async fn run(ctx: &CommandContext, host: &str) -> Result<HealthResponse> {
    let client = ctx.client(host)?;
    let health = check_health(client.as_ref(), host).await?;
    info!(host = %host, "Health check command successful");
    Ok(health)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FixedClientFactory;
    use crate::config::{MonitorConfig, ServerAddress};
    use crate::error::MonitorError;
    use crate::topology::TopologyResolver;
    use bao_client::MockSecretStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_command() {
        let mut config = MonitorConfig::default();
        config.server_addresses.insert(
            "a".to_string(),
            ServerAddress {
                host: "a.example".to_string(),
                port: 8200,
            },
        );
        let ctx = CommandContext::new(
            config,
            TopologyResolver::static_source(),
            Arc::new(FixedClientFactory::new().with_client("a", MockSecretStore::sealed("a", 2))),
        );

        let health = run(&ctx, "a").await.unwrap();
        assert!(health.sealed);
        assert_eq!(health.t, 2);

        assert!(matches!(
            run(&ctx, "missing").await,
            Err(MonitorError::NotFound(_))
        ));
    }
}
