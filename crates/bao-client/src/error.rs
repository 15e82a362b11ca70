//! Error types for the bao-client crate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API request to {path} failed with status {status}: {}", errors.join("; "))]
    Api {
        path: String,
        status: u16,
        errors: Vec<String>,
    },

    #[error("Unable to decode response from {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Server unreachable: {0}")]
    Unreachable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether the failure happened before a response was received
    pub fn is_connection_error(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_connect() || e.is_timeout(),
            ClientError::Unreachable(_) => true,
            _ => false,
        }
    }
}
