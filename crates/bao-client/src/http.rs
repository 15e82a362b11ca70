//! HttpSecretStore: SecretStore implementation over HTTPS

use async_trait::async_trait;
use reqwest::{Certificate, Client, Identity, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::types::{
    HealthResponse, InitRequest, InitResponse, RaftJoinRequest, RaftJoinResponse,
    SealStatusResponse,
};
use crate::SecretStore;

/// Header carrying the client token
const TOKEN_HEADER: &str = "X-Vault-Token";

/// Status codes requested from `sys/health` so that every server state
/// comes back as a 2xx response with a decodable body
const HEALTH_QUERY: &str = "uninitcode=299&sealedcode=299&standbycode=299\
&drsecondarycode=299&performancestandbycode=299";

/// Connection settings for one server
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    /// Base address, e.g. `https://bao-0.openbao.pod.cluster.local:8200`
    pub address: String,

    /// PEM CA bundle used to verify the server certificate
    pub ca_cert: Option<PathBuf>,

    /// PEM client certificate for mutual TLS
    pub client_cert: Option<PathBuf>,

    /// PEM private key matching `client_cert`
    pub client_key: Option<PathBuf>,

    /// Per-request timeout; `None` keeps the library default
    pub timeout: Option<Duration>,

    /// Token attached to authenticated requests (snapshots)
    pub token: Option<String>,
}

impl ClientSettings {
    /// Settings for `address` with no TLS overrides, timeout or token
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    fn has_tls_overrides(&self) -> bool {
        self.ca_cert.is_some() || self.client_cert.is_some() || self.client_key.is_some()
    }
}

/// Error body returned by the server on non-2xx responses
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// A `SecretStore` backed by the server's HTTP API.
///
/// Cheap to clone: `reqwest::Client` keeps its connection pool behind an `Arc`.
#[derive(Debug, Clone)]
pub struct HttpSecretStore {
    client: Client,
    address: String,
    token: Option<String>,
}

impl HttpSecretStore {
    /// Build a client from `settings`.
    ///
    /// TLS material is read eagerly so configuration problems surface here
    /// instead of on the first request.
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let mut builder = Client::builder().use_rustls_tls();

        if settings.has_tls_overrides() {
            if let Some(ref ca_path) = settings.ca_cert {
                let pem = std::fs::read(ca_path).map_err(|e| {
                    ClientError::Tls(format!("unable to read CA cert {}: {}", ca_path.display(), e))
                })?;
                let certs = Certificate::from_pem_bundle(&pem).map_err(|e| {
                    ClientError::Tls(format!("invalid CA cert {}: {}", ca_path.display(), e))
                })?;
                for cert in certs {
                    builder = builder.add_root_certificate(cert);
                }
            }

            match (&settings.client_cert, &settings.client_key) {
                (Some(cert_path), Some(key_path)) => {
                    let mut pem = std::fs::read(cert_path).map_err(|e| {
                        ClientError::Tls(format!(
                            "unable to read client cert {}: {}",
                            cert_path.display(),
                            e
                        ))
                    })?;
                    let key = std::fs::read(key_path).map_err(|e| {
                        ClientError::Tls(format!(
                            "unable to read client key {}: {}",
                            key_path.display(),
                            e
                        ))
                    })?;
                    pem.push(b'\n');
                    pem.extend_from_slice(&key);
                    let identity = Identity::from_pem(&pem)
                        .map_err(|e| ClientError::Tls(format!("invalid client identity: {}", e)))?;
                    builder = builder.identity(identity);
                }
                (None, None) => {}
                _ => {
                    return Err(ClientError::Tls(
                        "client cert and client key must be configured together".to_string(),
                    ))
                }
            }
        }

        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            address: settings.address.trim_end_matches('/').to_string(),
            token: settings.token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match self.token {
            Some(ref token) => builder.header(TOKEN_HEADER, token),
            None => builder,
        }
    }

    /// Turn non-2xx responses into `ClientError::Api`
    async fn check(path: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let errors = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.errors)
            .unwrap_or_else(|_| if text.is_empty() { Vec::new() } else { vec![text] });

        Err(ClientError::Api {
            path: path.to_string(),
            status: status.as_u16(),
            errors,
        })
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T> {
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl SecretStore for HttpSecretStore {
    fn address(&self) -> &str {
        &self.address
    }

    async fn health(&self) -> Result<HealthResponse> {
        let path = format!("sys/health?{}", HEALTH_QUERY);
        debug!(address = %self.address, "GET sys/health");

        let response = self.request(Method::GET, &path).send().await?;
        let response = Self::check("sys/health", response).await?;
        Self::decode("sys/health", response).await
    }

    async fn unseal(&self, key: &str) -> Result<SealStatusResponse> {
        debug!(address = %self.address, "PUT sys/unseal");

        let response = self
            .request(Method::PUT, "sys/unseal")
            .json(&serde_json::json!({ "key": key }))
            .send()
            .await?;
        let response = Self::check("sys/unseal", response).await?;
        Self::decode("sys/unseal", response).await
    }

    async fn init(&self, request: &InitRequest) -> Result<InitResponse> {
        debug!(address = %self.address, "PUT sys/init");

        let response = self
            .request(Method::PUT, "sys/init")
            .json(request)
            .send()
            .await?;
        let response = Self::check("sys/init", response).await?;
        Self::decode("sys/init", response).await
    }

    async fn raft_join(&self, request: &RaftJoinRequest) -> Result<RaftJoinResponse> {
        debug!(address = %self.address, leader = %request.leader_api_addr, "POST sys/storage/raft/join");

        let response = self
            .request(Method::POST, "sys/storage/raft/join")
            .json(request)
            .send()
            .await?;
        let response = Self::check("sys/storage/raft/join", response).await?;
        Self::decode("sys/storage/raft/join", response).await
    }

    async fn raft_snapshot(&self, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        debug!(address = %self.address, "GET sys/storage/raft/snapshot");

        let response = self
            .request(Method::GET, "sys/storage/raft/snapshot")
            .send()
            .await?;
        let mut response = Self::check("sys/storage/raft/snapshot", response).await?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        Ok(written)
    }

    async fn raft_snapshot_restore(&self, snapshot: Vec<u8>, force: bool) -> Result<()> {
        let path = if force {
            "sys/storage/raft/snapshot-force"
        } else {
            "sys/storage/raft/snapshot"
        };
        debug!(address = %self.address, bytes = snapshot.len(), "POST {}", path);

        let response = self.request(Method::POST, path).body(snapshot).send().await?;
        Self::check(path, response).await?;
        Ok(())
    }
}
