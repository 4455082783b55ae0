//! Logging Module
//!
//! Structured logging setup using the `tracing` crate.
//! `RUST_LOG` always wins over the configured level when it is set.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::utils::error::{AdvisoryError, Result};

/// Dependencies that are chatty at debug level and rarely useful
const QUIET_TARGETS: [&str; 4] = ["burn_ndarray", "reqwest", "hyper", "h2"];

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level for this crate and the hosts built on it
    pub level: Level,
    /// Whether to include target (module path)
    pub include_target: bool,
    pub include_thread_ids: bool,
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Debug level with targets and thread ids, for pipeline tracing
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Plain output for log collectors
    pub fn production() -> Self {
        Self {
            include_target: true,
            ansi_colors: false,
            ..Self::default()
        }
    }

    /// Override the level by name; unknown names keep the current level
    pub fn with_level_name(mut self, name: &str) -> Self {
        let name = if name.eq_ignore_ascii_case("warning") { "warn" } else { name };
        if let Ok(level) = Level::from_str(name) {
            self.level = level;
        }
        self
    }

    /// Filter directive used when `RUST_LOG` is unset
    pub fn directive(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        let mut parts = vec![level];
        // Never raise dependencies above warn, even in verbose mode
        parts.extend(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)));
        parts.join(",")
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AdvisoryError::Config(format!("Failed to initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_override_by_name() {
        assert_eq!(LogConfig::default().with_level_name("debug").level, Level::DEBUG);
        assert_eq!(LogConfig::default().with_level_name("Warning").level, Level::WARN);
        assert_eq!(LogConfig::verbose().with_level_name("nonsense").level, Level::DEBUG);
    }

    #[test]
    fn test_directive_quiets_dependencies() {
        let directive = LogConfig::verbose().directive();
        assert!(directive.starts_with("debug,"));
        assert!(directive.contains("reqwest=warn"));
        assert!(directive.contains("burn_ndarray=warn"));
    }

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, Level::INFO);
        assert_eq!(LogConfig::verbose().level, Level::DEBUG);
        assert!(!LogConfig::production().ansi_colors);
        assert!(LogConfig::production().include_target);
    }
}
