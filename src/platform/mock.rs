//! In-memory platform for tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::{Platform, PlatformError, PodInfo, Result, SecretInfo};

#[derive(Debug, Default)]
struct MockInner {
    pods: HashMap<String, Vec<PodInfo>>,
    secrets: HashMap<String, Vec<SecretInfo>>,
    unavailable: bool,
    pod_calls: usize,
    secret_calls: usize,
}

/// Namespace-keyed pod and secret listings that tests can rewrite between
/// reconciliation cycles
#[derive(Debug, Clone, Default)]
pub struct MockPlatform {
    inner: Arc<RwLock<MockInner>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MockInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MockInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the pod listing for `namespace`
    pub fn set_pods<I, N, A>(&self, namespace: &str, pods: I)
    where
        I: IntoIterator<Item = (N, A)>,
        N: Into<String>,
        A: Into<String>,
    {
        let pods = pods
            .into_iter()
            .map(|(name, ip)| PodInfo {
                name: name.into(),
                pod_ip: ip.into(),
            })
            .collect();
        self.write().pods.insert(namespace.to_string(), pods);
    }

    /// Add a secret whose `strdata` entry holds `payload`
    pub fn add_secret(&self, namespace: &str, name: &str, payload: &[u8]) {
        let mut data = BTreeMap::new();
        data.insert("strdata".to_string(), payload.to_vec());
        self.write()
            .secrets
            .entry(namespace.to_string())
            .or_default()
            .push(SecretInfo {
                name: name.to_string(),
                data,
            });
    }

    pub fn clear_secrets(&self, namespace: &str) {
        self.write().secrets.remove(namespace);
    }

    /// Make every listing fail as if the API server were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    pub fn pod_calls(&self) -> usize {
        self.read().pod_calls
    }

    pub fn secret_calls(&self) -> usize {
        self.read().secret_calls
    }

    fn check_available(inner: &MockInner) -> Result<()> {
        if inner.unavailable {
            return Err(PlatformError::Api {
                path: "/api/v1".to_string(),
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodInfo>> {
        let mut inner = self.write();
        inner.pod_calls += 1;
        Self::check_available(&inner)?;
        Ok(inner.pods.get(namespace).cloned().unwrap_or_default())
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<SecretInfo>> {
        let mut inner = self.write();
        inner.secret_calls += 1;
        Self::check_available(&inner)?;
        Ok(inner.secrets.get(namespace).cloned().unwrap_or_default())
    }
}
