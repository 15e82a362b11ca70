//! Wire-level tests for HttpSecretStore against a one-shot local HTTP server

use bao_client::{ClientError, ClientSettings, HttpSecretStore, RaftJoinRequest, SecretStore};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

/// What the server saw
#[derive(Debug)]
struct Recorded {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Accept one connection, record the request and answer with `status`/`body`
async fn serve_once(status: u16, body: &'static [u8]) -> (String, JoinHandle<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = find(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();

        let length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| v.parse::<usize>().unwrap())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before body");
            buf.extend_from_slice(&chunk[..n]);
        }

        let mut response = format!(
            "HTTP/1.1 {} Test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            status,
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        stream.write_all(&response).await.unwrap();
        let _ = stream.shutdown().await;

        Recorded {
            request_line,
            headers,
            body: buf[header_end..header_end + length].to_vec(),
        }
    });

    (address, handle)
}

fn client(address: &str, token: Option<&str>) -> HttpSecretStore {
    let settings = ClientSettings {
        timeout: Some(Duration::from_secs(5)),
        token: token.map(str::to_string),
        ..ClientSettings::new(address)
    };
    HttpSecretStore::new(settings).unwrap()
}

#[tokio::test]
async fn test_health_asks_for_success_codes() {
    let (address, server) =
        serve_once(200, br#"{"initialized": true, "sealed": true, "standby": false}"#).await;

    let health = assert_ok!(client(&address, None).health().await);
    assert!(health.sealed);
    assert!(health.initialized);

    let seen = server.await.unwrap();
    assert!(seen.request_line.starts_with("GET /v1/sys/health?"));
    assert!(seen.request_line.contains("sealedcode=299"));
    assert!(seen.request_line.contains("uninitcode=299"));
    assert_eq!(seen.header("x-vault-token"), None);
}

#[tokio::test]
async fn test_unseal_sends_key_and_token() {
    let (address, server) = serve_once(
        200,
        br#"{"type": "shamir", "initialized": true, "sealed": false, "t": 1, "n": 1, "progress": 0}"#,
    )
    .await;

    let status = assert_ok!(client(&address, Some("s.token")).unseal("0a1b2c").await);
    assert!(!status.sealed);
    assert_eq!(status.seal_type, "shamir");

    let seen = server.await.unwrap();
    assert!(seen.request_line.starts_with("PUT /v1/sys/unseal "));
    assert_eq!(seen.header("x-vault-token"), Some("s.token"));
    let body: serde_json::Value = serde_json::from_slice(&seen.body).unwrap();
    assert_eq!(body["key"], "0a1b2c");
}

#[tokio::test]
async fn test_error_body_becomes_api_error() {
    let (address, server) = serve_once(400, br#"{"errors": ["Vault is already initialized"]}"#).await;

    let err = assert_err!(
        client(&address, None)
            .init(&bao_client::InitRequest {
                secret_shares: 3,
                secret_threshold: 2,
                ..Default::default()
            })
            .await
    );
    match err {
        ClientError::Api { path, status, errors } => {
            assert_eq!(path, "sys/init");
            assert_eq!(status, 400);
            assert_eq!(errors, vec!["Vault is already initialized".to_string()]);
        }
        other => panic!("expected Api error, got {:?}", other),
    }

    let seen = server.await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&seen.body).unwrap();
    assert_eq!(body["secret_shares"], 3);
    assert!(body.get("recovery_shares").is_none());
}

#[tokio::test]
async fn test_raft_join_posts_leader() {
    let (address, server) = serve_once(200, br#"{"joined": true}"#).await;

    let request = RaftJoinRequest {
        leader_api_addr: "https://leader:8200".to_string(),
        ..Default::default()
    };
    let response = assert_ok!(client(&address, None).raft_join(&request).await);
    assert!(response.joined);

    let seen = server.await.unwrap();
    assert!(seen.request_line.starts_with("POST /v1/sys/storage/raft/join "));
    let body: serde_json::Value = serde_json::from_slice(&seen.body).unwrap();
    assert_eq!(body["leader_api_addr"], "https://leader:8200");
    assert!(body.get("leader_ca_cert").is_none());
}

#[tokio::test]
async fn test_snapshot_streams_body() {
    let (address, server) = serve_once(200, b"raft snapshot bytes").await;

    let mut out: Vec<u8> = Vec::new();
    let written = assert_ok!(client(&address, Some("s.token")).raft_snapshot(&mut out).await);
    assert_eq!(written, 19);
    assert_eq!(out, b"raft snapshot bytes");

    let seen = server.await.unwrap();
    assert!(seen.request_line.starts_with("GET /v1/sys/storage/raft/snapshot "));
    assert_eq!(seen.header("x-vault-token"), Some("s.token"));
}

#[tokio::test]
async fn test_forced_restore_path() {
    let (address, server) = serve_once(204, b"").await;

    assert_ok!(
        client(&address, Some("s.token"))
            .raft_snapshot_restore(b"snap".to_vec(), true)
            .await
    );

    let seen = server.await.unwrap();
    assert!(seen.request_line.starts_with("POST /v1/sys/storage/raft/snapshot-force "));
    assert_eq!(seen.body, b"snap");
}

#[tokio::test]
async fn test_closed_port_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = assert_err!(client(&address, None).health().await);
    assert!(err.is_connection_error());
}
