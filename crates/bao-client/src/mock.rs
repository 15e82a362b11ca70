//! Mock secret-store implementation for testing
//!
//! This provides an in-memory server that follows the threshold unseal
//! protocol closely enough to exercise reconciliation logic: each accepted
//! share raises `progress`, and reaching the threshold unseals the server.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{ClientError, Result};
use crate::types::{
    HealthResponse, InitRequest, InitResponse, RaftJoinRequest, RaftJoinResponse,
    SealStatusResponse,
};
use crate::SecretStore;

#[derive(Debug, Clone)]
struct MockState {
    initialized: bool,
    sealed: bool,
    threshold: u32,
    progress: u32,
    /// When set, only these keys count toward the threshold
    accepted_keys: Option<HashSet<String>>,
    unreachable: bool,
    fail_unseal: bool,
    raft_joined: bool,
    snapshot: Vec<u8>,
    submitted: Vec<String>,
    health_calls: usize,
    restored: Option<(Vec<u8>, bool)>,
    join_requests: Vec<RaftJoinRequest>,
}

/// In-memory secret-store server for tests
///
/// # Example
///
/// ```rust
/// use bao_client::{MockSecretStore, SecretStore};
///
/// #[tokio::test]
/// async fn test_with_mock() {
///     let server = MockSecretStore::sealed("bao-0", 1);
///     server.unseal("share").await.unwrap();
///     assert!(!server.health().await.unwrap().sealed);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockSecretStore {
    address: String,
    state: Arc<Mutex<MockState>>,
}

impl MockSecretStore {
    /// An initialized server that needs `threshold` shares to unseal
    pub fn sealed(address: impl Into<String>, threshold: u32) -> Self {
        Self::with_state(
            address,
            MockState {
                initialized: true,
                sealed: true,
                threshold,
                progress: 0,
                accepted_keys: None,
                unreachable: false,
                fail_unseal: false,
                raft_joined: true,
                snapshot: Vec::new(),
                submitted: Vec::new(),
                health_calls: 0,
                restored: None,
                join_requests: Vec::new(),
            },
        )
    }

    /// An initialized, unsealed server
    pub fn unsealed(address: impl Into<String>) -> Self {
        let server = Self::sealed(address, 1);
        server.lock().sealed = false;
        server
    }

    /// A server that has never been initialized
    pub fn uninitialized(address: impl Into<String>) -> Self {
        let server = Self::sealed(address, 0);
        server.lock().initialized = false;
        server
    }

    /// A sealed server that never reaches its threshold
    pub fn never_unseals(address: impl Into<String>) -> Self {
        Self::sealed(address, u32::MAX)
    }

    fn with_state(address: impl Into<String>, state: MockState) -> Self {
        Self {
            address: address.into(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Only count the given keys toward the threshold
    pub fn accept_only<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().accepted_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Make every call fail as if the server could not be reached
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Make `unseal` fail with an API error
    pub fn set_fail_unseal(&self, fail: bool) {
        self.lock().fail_unseal = fail;
    }

    /// Outcome reported by `raft_join`
    pub fn set_raft_joined(&self, joined: bool) {
        self.lock().raft_joined = joined;
    }

    /// Bytes returned by `raft_snapshot`
    pub fn set_snapshot(&self, data: &[u8]) {
        self.lock().snapshot = data.to_vec();
    }

    /// Seal the server again, resetting progress
    pub fn seal(&self) {
        let mut state = self.lock();
        state.sealed = true;
        state.progress = 0;
    }

    /// Keys submitted through `unseal`, in submission order
    pub fn submitted_keys(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    /// Number of `health` calls received
    pub fn health_calls(&self) -> usize {
        self.lock().health_calls
    }

    /// Last snapshot passed to `raft_snapshot_restore` and its force flag
    pub fn restored_snapshot(&self) -> Option<(Vec<u8>, bool)> {
        self.lock().restored.clone()
    }

    /// Requests received by `raft_join`
    pub fn join_requests(&self) -> Vec<RaftJoinRequest> {
        self.lock().join_requests.clone()
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    fn ensure_reachable(&self, state: &MockState) -> Result<()> {
        if state.unreachable {
            return Err(ClientError::Unreachable(format!(
                "connection refused: {}",
                self.address
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    fn address(&self) -> &str {
        &self.address
    }

    async fn health(&self) -> Result<HealthResponse> {
        let mut state = self.lock();
        state.health_calls += 1;
        self.ensure_reachable(&state)?;

        Ok(HealthResponse {
            initialized: state.initialized,
            sealed: state.sealed,
            t: state.threshold,
            progress: state.progress,
            ..Default::default()
        })
    }

    async fn unseal(&self, key: &str) -> Result<SealStatusResponse> {
        let mut state = self.lock();
        self.ensure_reachable(&state)?;
        state.submitted.push(key.to_string());

        if state.fail_unseal {
            return Err(ClientError::Api {
                path: "sys/unseal".to_string(),
                status: 500,
                errors: vec!["internal error".to_string()],
            });
        }

        let counts = state
            .accepted_keys
            .as_ref()
            .map_or(true, |accepted| accepted.contains(key));

        if state.sealed && counts {
            state.progress = state.progress.saturating_add(1);
            if state.progress >= state.threshold {
                state.sealed = false;
                state.progress = 0;
            }
        }

        Ok(SealStatusResponse {
            seal_type: "shamir".to_string(),
            initialized: state.initialized,
            sealed: state.sealed,
            t: state.threshold,
            progress: state.progress,
            ..Default::default()
        })
    }

    async fn init(&self, request: &InitRequest) -> Result<InitResponse> {
        let mut state = self.lock();
        self.ensure_reachable(&state)?;

        if state.initialized {
            return Err(ClientError::Api {
                path: "sys/init".to_string(),
                status: 400,
                errors: vec!["Vault is already initialized".to_string()],
            });
        }

        state.initialized = true;
        state.sealed = true;
        state.threshold = request.secret_threshold;
        state.progress = 0;

        let keys: Vec<String> = (0..request.secret_shares)
            .map(|i| format!("{:02x}{}", i, "ab".repeat(31)))
            .collect();
        let recovery_keys: Vec<String> = (0..request.recovery_shares.unwrap_or(0))
            .map(|i| format!("{:02x}{}", i, "cd".repeat(31)))
            .collect();

        Ok(InitResponse {
            keys_base64: keys.iter().map(|k| fake_base64(k)).collect(),
            recovery_keys_base64: recovery_keys.iter().map(|k| fake_base64(k)).collect(),
            keys,
            recovery_keys,
            root_token: "s.MockRootTokenAbcdefghijklmnop".to_string(),
        })
    }

    async fn raft_join(&self, request: &RaftJoinRequest) -> Result<RaftJoinResponse> {
        let mut state = self.lock();
        self.ensure_reachable(&state)?;
        state.join_requests.push(request.clone());

        Ok(RaftJoinResponse {
            joined: state.raft_joined,
        })
    }

    async fn raft_snapshot(&self, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let data = {
            let state = self.lock();
            self.ensure_reachable(&state)?;
            state.snapshot.clone()
        };

        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(data.len() as u64)
    }

    async fn raft_snapshot_restore(&self, snapshot: Vec<u8>, force: bool) -> Result<()> {
        let mut state = self.lock();
        self.ensure_reachable(&state)?;
        state.restored = Some((snapshot, force));
        Ok(())
    }
}

/// Hex share strings are valid base64 alphabet; pad to a multiple of four.
fn fake_base64(key: &str) -> String {
    let mut encoded = key.to_string();
    while encoded.len() % 4 != 0 {
        encoded.push('=');
    }
    encoded
}
