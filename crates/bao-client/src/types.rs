//! Request and response bodies for the `sys/` endpoints
//!
//! Field names follow the server's JSON. Fields the monitor does not act on
//! are still decoded so they can be printed by the one-shot commands.

use serde::{Deserialize, Serialize};

/// Response from `GET sys/health`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub initialized: bool,
    pub sealed: bool,
    #[serde(default)]
    pub standby: bool,
    #[serde(default)]
    pub performance_standby: bool,
    /// Unseal threshold; only present when the server reports it
    #[serde(default)]
    pub t: u32,
    /// Shares accepted toward the threshold so far
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub server_time_utc: i64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub cluster_id: String,
}

/// Response from `PUT sys/unseal` and `GET sys/seal-status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealStatusResponse {
    #[serde(rename = "type", default)]
    pub seal_type: String,
    #[serde(default)]
    pub initialized: bool,
    pub sealed: bool,
    /// Unseal threshold
    #[serde(default)]
    pub t: u32,
    /// Total number of shares
    #[serde(default)]
    pub n: u32,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub migration: bool,
    #[serde(default)]
    pub recovery_seal: bool,
    #[serde(default)]
    pub storage_type: String,
}

/// Body for `PUT sys/init`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    #[serde(default)]
    pub secret_shares: u32,
    #[serde(default)]
    pub secret_threshold: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_shares: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pgp_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_shares: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery_pgp_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_token_pgp_key: Option<String>,
}

/// Response from `PUT sys/init`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResponse {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub keys_base64: Vec<String>,
    #[serde(default)]
    pub recovery_keys: Vec<String>,
    #[serde(default)]
    pub recovery_keys_base64: Vec<String>,
    pub root_token: String,
}

/// Body for `POST sys/storage/raft/join`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftJoinRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub leader_api_addr: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub leader_ca_cert: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub leader_client_cert: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub leader_client_key: String,
    #[serde(default)]
    pub retry: bool,
    #[serde(default)]
    pub non_voter: bool,
}

/// Response from `POST sys/storage/raft/join`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftJoinResponse {
    pub joined: bool,
}
