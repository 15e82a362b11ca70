//! bao-client: API boundary for OpenBao secret-store servers
//!
//! This crate defines the `SecretStore` trait, which abstracts the handful of
//! `sys/` endpoints the monitor needs so the reconciliation logic can run
//! against a real server or an in-memory double.
//!
//! # Architecture
//!
//! The `SecretStore` trait groups the operations into two categories:
//!
//! 1. **Seal management**: health probe and unseal share submission
//! 2. **Administration**: init, raft join, snapshot create/restore
//!
//! Implementations:
//! - **HttpSecretStore**: HTTPS client built on `reqwest`
//! - **MockSecretStore**: in-memory server used by tests
//!
//! # Example
//!
//! ```rust,no_run
//! use bao_client::{ClientSettings, HttpSecretStore, SecretStore};
//!
//! async fn example() -> Result<(), bao_client::ClientError> {
//!     let settings = ClientSettings::new("https://bao-0.openbao.pod.cluster.local:8200");
//!     let client = HttpSecretStore::new(settings)?;
//!
//!     let health = client.health().await?;
//!     if health.sealed {
//!         let status = client.unseal("share-key").await?;
//!         println!("progress {}/{}", status.progress, status.t);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use tokio::io::AsyncWrite;

pub mod error;
pub mod http;
pub mod mock;
pub mod types;

pub use error::{ClientError, Result};
pub use http::{ClientSettings, HttpSecretStore};
pub use mock::MockSecretStore;
pub use types::{
    HealthResponse, InitRequest, InitResponse, RaftJoinRequest, RaftJoinResponse,
    SealStatusResponse,
};

/// Operations the monitor performs against a single secret-store server.
///
/// All calls are single request/response exchanges; no retries happen here.
/// Retry policy belongs to the caller.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so they can be shared as
/// `Arc<dyn SecretStore>` across async tasks.
#[async_trait]
pub trait SecretStore: Send + Sync + 'static {
    /// Address this client talks to, used for log and error context
    fn address(&self) -> &str;

    /// Query `sys/health`.
    ///
    /// Sealed, uninitialized and standby servers are reported as regular
    /// responses rather than errors.
    async fn health(&self) -> Result<HealthResponse>;

    /// Submit one unseal key share and return the resulting seal status
    async fn unseal(&self, key: &str) -> Result<SealStatusResponse>;

    /// Initialize a fresh server
    async fn init(&self, request: &InitRequest) -> Result<InitResponse>;

    /// Join this node to a raft cluster
    async fn raft_join(&self, request: &RaftJoinRequest) -> Result<RaftJoinResponse>;

    /// Stream a raft snapshot into `writer`, returning the number of bytes written
    async fn raft_snapshot(&self, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64>;

    /// Restore a raft snapshot
    ///
    /// `force` skips the server's snapshot/keyring compatibility check.
    async fn raft_snapshot_restore(&self, snapshot: Vec<u8>, force: bool) -> Result<()>;
}
