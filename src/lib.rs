/*!
 * baomon - keeps a fleet of OpenBao servers unsealed
 *
 * - Credential and topology store persisted as YAML, validated on every load
 * - Topology and secrets optionally pulled from Kubernetes each cycle
 * - Reconciliation loop that probes every server and feeds key shares to
 *   sealed ones, isolating per-server failures
 * - One-shot administrative commands: init, raft join, snapshot create/restore
 */

pub mod client;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod error;
pub mod health;
pub mod logging;
pub mod platform;
pub mod stats;
pub mod topology;
pub mod unseal;
pub mod validate;

// Re-export commonly used types
pub use client::{ClientFactory, FixedClientFactory, HttpClientFactory};
pub use config::{KeyShard, LogLevel, MonitorConfig, ServerAddress, Token};
pub use daemon::{Clock, Monitor, TokioClock};
pub use error::{MonitorError, Result};
pub use stats::CycleStats;
pub use topology::{TopologyResolver, TopologySource};
pub use validate::ValidationPolicy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
