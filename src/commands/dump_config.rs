//! `dump-config read|write|global`: developer helpers for the YAML store

use std::path::Path;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::validate::ValidationPolicy;

/// Load and validate `path`
pub fn read(path: &Path, policy: &ValidationPolicy) -> Result<MonitorConfig> {
    MonitorConfig::load_with_policy(path, policy)
}

/// Load `from` and write it back out to `to`
pub fn write(from: &Path, to: &Path, policy: &ValidationPolicy) -> Result<()> {
    read(from, policy)?.save(to)
}

/// The in-memory store as YAML
pub fn global(config: &MonitorConfig) -> Result<String> {
    Ok(serde_yaml::to_string(config)?)
}
