//! `join-raft NODE`

use bao_client::RaftJoinRequest;
use std::path::PathBuf;
use tracing::info;

use super::CommandContext;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};

/// Build the join request from either a JSON file or a leader address.
///
/// With a leader address the leader's CA certificate is read from the
/// configured `CACert` path.
pub fn join_request(
    config: &MonitorConfig,
    raft_config: Option<PathBuf>,
    raft_address: Option<String>,
) -> Result<RaftJoinRequest> {
    if let Some(path) = raft_config {
        let data = std::fs::read(&path).map_err(|e| {
            MonitorError::InvalidArgument(format!(
                "unable to open file for raft-config {}: {}",
                path.display(),
                e
            ))
        })?;
        return serde_json::from_slice(&data).map_err(|e| {
            MonitorError::InvalidArgument(format!(
                "unable to parse raft-config {}: {}",
                path.display(),
                e
            ))
        });
    }

    let Some(address) = raft_address else {
        return Err(MonitorError::InvalidArgument(
            "either raft-config or raft-address must be specified".to_string(),
        ));
    };

    let ca_cert = std::fs::read_to_string(&config.ca_cert).map_err(|e| {
        MonitorError::ConfigInvalid(format!(
            "error with trying to read the CACert file {}: {}",
            config.ca_cert, e
        ))
    })?;

    Ok(RaftJoinRequest {
        leader_api_addr: address,
        leader_ca_cert: ca_cert.strip_suffix('\n').unwrap_or(&ca_cert).to_string(),
        ..Default::default()
    })
}

pub async fn run(ctx: &CommandContext, node: &str, request: &RaftJoinRequest) -> Result<()> {
    let client = ctx.client(node)?;

    let response = client
        .raft_join(request)
        .await
        .map_err(|source| MonitorError::Api {
            host: node.to_string(),
            operation: "raft join",
            source,
        })?;

    if !response.joined {
        return Err(MonitorError::RaftJoinRejected {
            node: node.to_string(),
        });
    }

    info!(node = %node, leader = %request.leader_api_addr, "Raft join successful");
    Ok(())
}
