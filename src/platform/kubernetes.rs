//! Kubernetes REST client
//!
//! Only the two core/v1 list endpoints are used, so the client is a thin
//! layer over `reqwest` that knows how to find the API server and its
//! credentials, either from the pod's service account or from a kubeconfig.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Certificate, Client, Identity};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::{PlatformError, PodInfo, Result, SecretInfo};
use super::Platform;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Resolved API server location and credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeConnection {
    pub server: String,
    pub ca_pem: Option<Vec<u8>>,
    pub bearer_token: Option<String>,
    /// Client certificate followed by its key, both PEM
    pub identity_pem: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
}

impl KubeConnection {
    /// Service-account credentials mounted into every pod
    pub fn in_cluster() -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            PlatformError::Config("KUBERNETES_SERVICE_HOST is not set".to_string())
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").map_err(|_| {
            PlatformError::Config("KUBERNETES_SERVICE_PORT is not set".to_string())
        })?;
        Self::from_service_account(&host, &port, Path::new(SERVICE_ACCOUNT_DIR))
    }

    pub fn from_service_account(host: &str, port: &str, dir: &Path) -> Result<Self> {
        let token = std::fs::read_to_string(dir.join("token"))?;
        let ca_pem = std::fs::read(dir.join("ca.crt"))?;

        let server = if host.contains(':') {
            format!("https://[{}]:{}", host, port)
        } else {
            format!("https://{}:{}", host, port)
        };

        Ok(Self {
            server,
            ca_pem: Some(ca_pem),
            bearer_token: Some(token.trim().to_string()),
            identity_pem: None,
            insecure_skip_tls_verify: false,
        })
    }

    pub fn from_kubeconfig(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            PlatformError::Config(format!("unable to read kubeconfig {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_kubeconfig_str(&data, base_dir)
    }

    /// Resolve the current context. Relative file references are taken
    /// relative to `base_dir`.
    pub fn from_kubeconfig_str(data: &str, base_dir: &Path) -> Result<Self> {
        let kubeconfig: Kubeconfig = serde_yaml::from_str(data)
            .map_err(|e| PlatformError::Config(format!("invalid kubeconfig: {}", e)))?;

        let context_name = kubeconfig
            .current_context
            .as_deref()
            .or_else(|| kubeconfig.contexts.first().map(|c| c.name.as_str()))
            .ok_or_else(|| PlatformError::Config("kubeconfig has no contexts".to_string()))?;

        let context = kubeconfig
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| {
                PlatformError::Config(format!("context {} not found in kubeconfig", context_name))
            })?;

        let cluster = kubeconfig
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                PlatformError::Config(format!("cluster {} not found in kubeconfig", context.cluster))
            })?;

        let user = match context.user {
            Some(ref name) => kubeconfig
                .users
                .iter()
                .find(|u| &u.name == name)
                .map(|u| u.user.clone())
                .ok_or_else(|| {
                    PlatformError::Config(format!("user {} not found in kubeconfig", name))
                })?,
            None => KubeUser::default(),
        };

        let ca_pem = inline_or_file(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            base_dir,
        )?;

        let bearer_token = match (&user.token, &user.token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(file)) => {
                Some(std::fs::read_to_string(resolve(base_dir, file))?.trim().to_string())
            }
            (None, None) => None,
        };

        let cert = inline_or_file(
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
            base_dir,
        )?;
        let key = inline_or_file(
            user.client_key_data.as_deref(),
            user.client_key.as_deref(),
            base_dir,
        )?;
        let identity_pem = match (cert, key) {
            (Some(mut cert), Some(key)) => {
                cert.push(b'\n');
                cert.extend_from_slice(&key);
                Some(cert)
            }
            (None, None) => None,
            _ => {
                return Err(PlatformError::Config(
                    "kubeconfig user has a client certificate without a key".to_string(),
                ))
            }
        };

        Ok(Self {
            server: cluster.server.trim_end_matches('/').to_string(),
            ca_pem,
            bearer_token,
            identity_pem,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
        })
    }
}

fn resolve(base_dir: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn inline_or_file(data: Option<&str>, file: Option<&str>, base_dir: &Path) -> Result<Option<Vec<u8>>> {
    if let Some(data) = data {
        return STANDARD
            .decode(data.trim())
            .map(Some)
            .map_err(|e| PlatformError::Config(format!("invalid base64 in kubeconfig: {}", e)));
    }
    match file {
        Some(file) => Ok(Some(std::fs::read(resolve(base_dir, file))?)),
        None => Ok(None),
    }
}

/// Kubernetes API client for pod and secret listings
#[derive(Debug, Clone)]
pub struct KubeClient {
    client: Client,
    server: String,
    bearer_token: Option<String>,
}

impl KubeClient {
    /// Every API call fails with a transport error after `timeout`
    pub fn new(connection: KubeConnection, timeout: Duration) -> Result<Self> {
        let mut builder = Client::builder().use_rustls_tls().timeout(timeout);

        if let Some(ref pem) = connection.ca_pem {
            let certs = Certificate::from_pem_bundle(pem)
                .map_err(|e| PlatformError::Config(format!("invalid cluster CA: {}", e)))?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        if let Some(ref pem) = connection.identity_pem {
            let identity = Identity::from_pem(pem)
                .map_err(|e| PlatformError::Config(format!("invalid client identity: {}", e)))?;
            builder = builder.identity(identity);
        }

        if connection.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
            server: connection.server,
            bearer_token: connection.bearer_token,
        })
    }

    pub fn in_cluster(timeout: Duration) -> Result<Self> {
        Self::new(KubeConnection::in_cluster()?, timeout)
    }

    pub fn from_kubeconfig(path: &Path, timeout: Duration) -> Result<Self> {
        Self::new(KubeConnection::from_kubeconfig(path)?, timeout)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.server, path);
        debug!(url = %url, "GET");

        let mut request = self.client.get(&url);
        if let Some(ref token) = self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiStatus>(&body)
                .map(|s| s.message)
                .unwrap_or(body);
            return Err(PlatformError::Api {
                path: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| PlatformError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Platform for KubeClient {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodInfo>> {
        let list: ObjectList<Pod> = self
            .get(&format!("/api/v1/namespaces/{}/pods", namespace))
            .await?;
        Ok(list.into_pods())
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<SecretInfo>> {
        let path = format!("/api/v1/namespaces/{}/secrets", namespace);
        let list: ObjectList<Secret> = self.get(&path).await?;
        list.into_secrets(&path)
    }
}

// Kubernetes wire types, reduced to the fields read here

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(rename = "podIP", default)]
    pod_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Secret {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    data: Option<BTreeMap<String, String>>,
}

impl ObjectList<Pod> {
    fn into_pods(self) -> Vec<PodInfo> {
        self.items
            .into_iter()
            .map(|pod| PodInfo {
                name: pod.metadata.name,
                pod_ip: pod.status.pod_ip.unwrap_or_default(),
            })
            .collect()
    }
}

impl ObjectList<Secret> {
    fn into_secrets(self, path: &str) -> Result<Vec<SecretInfo>> {
        self.items
            .into_iter()
            .map(|secret| {
                let name = secret.metadata.name;
                let data = secret
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(key, value)| {
                        STANDARD.decode(&value).map(|bytes| (key, bytes)).map_err(|e| {
                            PlatformError::Decode {
                                path: path.to_string(),
                                reason: format!("secret {} has invalid base64 data: {}", name, e),
                            }
                        })
                    })
                    .collect::<Result<BTreeMap<_, _>>>()?;
                Ok(SecretInfo { name, data })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(rename = "current-context", default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: KubeCluster,
}

#[derive(Debug, Deserialize)]
struct KubeCluster {
    server: String,
    #[serde(rename = "certificate-authority-data", default)]
    certificate_authority_data: Option<String>,
    #[serde(rename = "certificate-authority", default)]
    certificate_authority: Option<String>,
    #[serde(rename = "insecure-skip-tls-verify", default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: KubeContext,
}

#[derive(Debug, Deserialize)]
struct KubeContext {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    user: KubeUser,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct KubeUser {
    #[serde(default)]
    token: Option<String>,
    #[serde(rename = "tokenFile", default)]
    token_file: Option<String>,
    #[serde(rename = "client-certificate-data", default)]
    client_certificate_data: Option<String>,
    #[serde(rename = "client-certificate", default)]
    client_certificate: Option<String>,
    #[serde(rename = "client-key-data", default)]
    client_key_data: Option<String>,
    #[serde(rename = "client-key", default)]
    client_key: Option<String>,
}
