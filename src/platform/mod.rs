//! Orchestration platform boundary
//!
//! The topology resolver only needs two listings from the platform: the
//! server pods in a namespace and the secret objects in that namespace.
//! [`Platform`] is that seam; [`KubeClient`] talks to a real Kubernetes API
//! server and [`MockPlatform`] serves canned listings to tests.

pub mod kubernetes;
pub mod mock;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub use kubernetes::{KubeClient, KubeConnection};
pub use mock::MockPlatform;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Kubernetes API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Kubernetes API returned {status} for {path}: {message}")]
    Api {
        path: String,
        status: u16,
        message: String,
    },

    #[error("Kubernetes client configuration error: {0}")]
    Config(String),

    #[error("Malformed Kubernetes API response for {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// A pod as far as topology discovery is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,

    /// Cluster-internal IP; empty while the pod is pending
    pub pod_ip: String,
}

/// A secret object with its values already base64-decoded
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecretInfo {
    pub name: String,
    pub data: BTreeMap<String, Vec<u8>>,
}

#[async_trait]
pub trait Platform: Send + Sync + 'static {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodInfo>>;

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<SecretInfo>>;
}
