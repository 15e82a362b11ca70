/*!
 * `init HOST`
 *
 * Initializes a fresh server and records the issued root token and key
 * shares in the store.
 */

use bao_client::InitRequest;
use std::path::PathBuf;
use tracing::info;

use super::CommandContext;
use crate::error::{MonitorError, Result};
use crate::health::check_health;

/// Where the init parameters come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOptions {
    /// JSON body for `sys/init`
    File(PathBuf),
    Shares { shares: u32, threshold: u32 },
}

impl InitOptions {
    /// Exactly one of `file` or both share flags must be given
    pub fn from_flags(
        file: Option<PathBuf>,
        shares: Option<u32>,
        threshold: Option<u32>,
    ) -> Result<Self> {
        match (file, shares, threshold) {
            (Some(file), None, None) => Ok(InitOptions::File(file)),
            (None, Some(shares), Some(threshold)) => Ok(InitOptions::Shares { shares, threshold }),
            _ => Err(MonitorError::InvalidArgument(
                "init options must be given either as --file, or as both --secret-shares and --secret-threshold"
                    .to_string(),
            )),
        }
    }

    pub fn into_request(self) -> Result<InitRequest> {
        match self {
            InitOptions::File(path) => {
                let data = std::fs::read(&path).map_err(|e| {
                    MonitorError::InvalidArgument(format!(
                        "unable to open init option file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                serde_json::from_slice(&data).map_err(|e| {
                    MonitorError::InvalidArgument(format!(
                        "unable to parse JSON file {}: {}",
                        path.display(),
                        e
                    ))
                })
            }
            InitOptions::Shares { shares, threshold } => {
                if shares == 0 {
                    return Err(MonitorError::InvalidArgument(
                        "the field secret-shares cannot be 0".to_string(),
                    ));
                }
                if threshold == 0 {
                    return Err(MonitorError::InvalidArgument(
                        "the field secret-threshold cannot be 0".to_string(),
                    ));
                }
                if shares < threshold {
                    return Err(MonitorError::InvalidArgument(
                        "the field secret-threshold cannot be greater than secret-shares"
                            .to_string(),
                    ));
                }
                Ok(InitRequest {
                    secret_shares: shares,
                    secret_threshold: threshold,
                    ..Default::default()
                })
            }
        }
    }
}

pub async fn run(ctx: &mut CommandContext, host: &str, request: &InitRequest) -> Result<()> {
    let client = ctx.client(host)?;

    let health = check_health(client.as_ref(), host).await?;
    if health.initialized {
        return Err(MonitorError::AlreadyInitialized {
            host: host.to_string(),
        });
    }

    let response = client
        .init(request)
        .await
        .map_err(|source| MonitorError::Api {
            host: host.to_string(),
            operation: "init",
            source,
        })?;

    ctx.config.parse_init_response(host, &response)?;
    info!(host = %host, shares = response.keys.len(), "Init successful");
    Ok(())
}
