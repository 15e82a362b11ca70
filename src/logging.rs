/*!
 * Logging and tracing initialization
 */

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogLevel, MonitorConfig};
use crate::error::{MonitorError, Result};
use crate::validate::ValidationPolicy;

/// Where and how verbosely to log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,

    /// Append to this file instead of writing to stderr
    pub log_path: Option<PathBuf>,
}

impl LogSettings {
    pub fn from_config(config: &MonitorConfig, policy: &ValidationPolicy) -> Result<Self> {
        Ok(Self {
            level: config.interpret_log_level(policy)?,
            log_path: if config.log_path.is_empty() {
                None
            } else {
                Some(PathBuf::from(&config.log_path))
            },
        })
    }

    pub fn logs_to_file(&self) -> bool {
        self.log_path.is_some()
    }

    fn filter_directive(&self) -> String {
        let level = self.level.to_tracing_level();
        format!("baomon={},bao_client={}", level, level)
    }
}

/// Initialize structured logging. `RUST_LOG` overrides the configured level.
pub fn init_logging(settings: &LogSettings) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.filter_directive()))
        .map_err(|e| MonitorError::ConfigInvalid(format!("Failed to create log filter: {}", e)))?;

    if let Some(ref log_path) = settings.log_path {
        init_file_logging(log_path, env_filter)?;
    } else {
        init_stderr_logging(env_filter);
    }

    Ok(())
}

fn init_stderr_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Append to the log file; it is shared across invocations
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| {
            MonitorError::ConfigInvalid(format!("error in opening the log file to write: {}", e))
        })?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NONE)
        .with_ansi(false) // No ANSI colors in file
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Initialize logging with custom format for testing
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("baomon=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_settings_from_config() {
        let policy = ValidationPolicy::default();
        let config = MonitorConfig {
            log_level: "3".to_string(),
            log_path: "/var/log/baomon.log".to_string(),
            ..Default::default()
        };

        let settings = LogSettings::from_config(&config, &policy).unwrap();
        assert_eq!(settings.level, LogLevel::Warn);
        assert!(settings.logs_to_file());
        assert_eq!(settings.filter_directive(), "baomon=WARN,bao_client=WARN");
    }

    #[test]
    fn test_defaults_to_stderr_at_info() {
        let settings =
            LogSettings::from_config(&MonitorConfig::default(), &ValidationPolicy::default())
                .unwrap();

        assert_eq!(settings.level, LogLevel::Info);
        assert!(!settings.logs_to_file());
    }

    #[test]
    fn test_invalid_level_rejected() {
        let config = MonitorConfig {
            log_level: "9".to_string(),
            ..Default::default()
        };

        assert!(LogSettings::from_config(&config, &ValidationPolicy::default()).is_err());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), Level::ERROR);
        assert_eq!(LogLevel::Warn.to_tracing_level(), Level::WARN);
        assert_eq!(LogLevel::Info.to_tracing_level(), Level::INFO);
        assert_eq!(LogLevel::Debug.to_tracing_level(), Level::DEBUG);
    }
}
