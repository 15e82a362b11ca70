//! `unseal HOST`

use bao_client::SealStatusResponse;
use tracing::info;

use super::CommandContext;
use crate::error::Result;
use crate::unseal::run_unseal;

pub async fn run(ctx: &CommandContext, host: &str) -> Result<SealStatusResponse> {
    let client = ctx.client(host)?;
    let status = run_unseal(client.as_ref(), host, &ctx.config.unseal_key_shards).await?;
    info!(host = %host, "Unseal successful");
    Ok(status)
}
