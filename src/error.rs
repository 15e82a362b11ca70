/*!
 * Error types for baomon
 */

use bao_client::ClientError;
use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

#[derive(Debug)]
pub enum MonitorError {
    /// Configuration invariant violated on load or refresh
    ConfigInvalid(String),

    /// Orchestration platform unreachable or returned malformed data
    TopologyUnavailable(String),

    /// Client could not be built from the TLS/address settings
    ClientConstructionFailed { host: String, reason: String },

    /// Logical server name missing from the address book
    NotFound(String),

    /// Health probe failed
    HostUnreachable { host: String, source: ClientError },

    /// Unseal requested for a host that is already unsealed
    AlreadySealedPrecondition { host: String },

    /// Operation requires an unsealed host but it is sealed
    HostSealed { host: String },

    /// Every eligible key share was submitted and the host is still sealed
    SharesExhausted { host: String },

    /// Transport or API error while submitting one unseal share
    SubmissionFailed { host: String, source: ClientError },

    /// Init requested for a host that is already initialized
    AlreadyInitialized { host: String },

    /// The raft join call completed but the node did not join
    RaftJoinRejected { node: String },

    /// Administrative API call failed
    Api {
        host: String,
        operation: &'static str,
        source: ClientError,
    },

    /// Invalid command-line options
    InvalidArgument(String),

    /// I/O error
    Io(io::Error),
}

impl MonitorError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }

    /// Fleet-wide errors abort the reconciliation loop; per-host errors are
    /// logged and the loop moves on to the next host.
    pub fn is_fatal(&self) -> bool {
        match self {
            MonitorError::ConfigInvalid(_) => true,
            MonitorError::TopologyUnavailable(_) => true,
            MonitorError::ClientConstructionFailed { .. } => true,
            MonitorError::NotFound(_) => true,
            MonitorError::InvalidArgument(_) => true,
            MonitorError::Io(_) => true,

            MonitorError::HostUnreachable { .. } => false,
            MonitorError::AlreadySealedPrecondition { .. } => false,
            MonitorError::HostSealed { .. } => false,
            MonitorError::SharesExhausted { .. } => false,
            MonitorError::SubmissionFailed { .. } => false,
            MonitorError::AlreadyInitialized { .. } => false,
            MonitorError::RaftJoinRejected { .. } => false,
            MonitorError::Api { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            MonitorError::ConfigInvalid(_) | MonitorError::InvalidArgument(_) => {
                ErrorCategory::Configuration
            }
            MonitorError::TopologyUnavailable(_) => ErrorCategory::Topology,
            MonitorError::ClientConstructionFailed { .. } | MonitorError::NotFound(_) => {
                ErrorCategory::Client
            }
            MonitorError::HostUnreachable { .. } | MonitorError::Api { .. } => {
                ErrorCategory::Network
            }
            MonitorError::AlreadySealedPrecondition { .. }
            | MonitorError::HostSealed { .. }
            | MonitorError::AlreadyInitialized { .. } => ErrorCategory::Precondition,
            MonitorError::SharesExhausted { .. } | MonitorError::SubmissionFailed { .. } => {
                ErrorCategory::Unseal
            }
            MonitorError::RaftJoinRejected { .. } => ErrorCategory::Raft,
            MonitorError::Io(_) => ErrorCategory::IoError,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Config file or command-line problems
    Configuration,
    /// Orchestration platform discovery
    Topology,
    /// API client setup
    Client,
    /// Network/API call failures
    Network,
    /// Server state did not match what the operation requires
    Precondition,
    /// Unseal share submission
    Unseal,
    /// Raft cluster membership
    Raft,
    /// Local I/O
    IoError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Topology => write!(f, "topology"),
            ErrorCategory::Client => write!(f, "client"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Precondition => write!(f, "precondition"),
            ErrorCategory::Unseal => write!(f, "unseal"),
            ErrorCategory::Raft => write!(f, "raft"),
            ErrorCategory::IoError => write!(f, "io"),
        }
    }
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::ConfigInvalid(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
            MonitorError::TopologyUnavailable(msg) => {
                write!(f, "Topology refresh failed: {}", msg)
            }
            MonitorError::ClientConstructionFailed { host, reason } => {
                write!(f, "Unable to create client for host {}: {}", host, reason)
            }
            MonitorError::NotFound(name) => {
                write!(
                    f,
                    "Unable to find {} under the list of available server addresses",
                    name
                )
            }
            MonitorError::HostUnreachable { host, source } => {
                write!(f, "Health check failed for host {}: {}", host, source)
            }
            MonitorError::AlreadySealedPrecondition { host } => {
                write!(f, "Server on host {} is already unsealed", host)
            }
            MonitorError::HostSealed { host } => {
                write!(f, "Server on host {} is currently sealed", host)
            }
            MonitorError::SharesExhausted { host } => {
                write!(f, "Exhausted all non-recovery key shares for host {}", host)
            }
            MonitorError::SubmissionFailed { host, source } => {
                write!(f, "Unseal call failed for host {}: {}", host, source)
            }
            MonitorError::AlreadyInitialized { host } => {
                write!(f, "Server on host {} is already initialized", host)
            }
            MonitorError::RaftJoinRejected { node } => {
                write!(f, "Node {} did not join the raft cluster", node)
            }
            MonitorError::Api {
                host,
                operation,
                source,
            } => {
                write!(f, "{} failed for host {}: {}", operation, host, source)
            }
            MonitorError::InvalidArgument(msg) => {
                write!(f, "Invalid argument: {}", msg)
            }
            MonitorError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::HostUnreachable { source, .. }
            | MonitorError::SubmissionFailed { source, .. }
            | MonitorError::Api { source, .. } => Some(source),
            MonitorError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for MonitorError {
    fn from(err: io::Error) -> Self {
        MonitorError::Io(err)
    }
}

impl From<serde_yaml::Error> for MonitorError {
    fn from(err: serde_yaml::Error) -> Self {
        MonitorError::ConfigInvalid(format!("YAML error: {}", err))
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::ConfigInvalid(format!("JSON parse error: {}", err))
    }
}
