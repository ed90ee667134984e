//! # Logging
//!
//! The library only emits `tracing` events. Applications and tools that do
//! not install their own subscriber can use [`init_logging`].

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    pub json_format: bool,
    /// Enable pretty printing for development
    pub pretty_print: bool,
    /// Environment filter (e.g. "convex_orm=debug,reqwest=info")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            pretty_print: false,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Create production logging configuration
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            json_format: true,
            pretty_print: false,
            env_filter: Some("convex_orm=info,convex_cache=warn,reqwest=warn".to_string()),
        }
    }

    /// Create development logging configuration
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            pretty_print: true,
            env_filter: Some("convex_orm=debug,convex_cache=debug".to_string()),
        }
    }

    /// Create test logging configuration (minimal output)
    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            json_format: false,
            pretty_print: false,
            env_filter: Some("convex_orm=error".to_string()),
        }
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }
}

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. Fails if a
/// global subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = config.env_filter.as_deref().unwrap_or(&config.level);

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(env_filter))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout).json())
            .try_init()?;
    } else if config.pretty_print {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout).pretty())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout))
            .try_init()?;
    }

    tracing::info!(
        target: "convex::logging",
        "Logging initialized (level: {}, format: {})",
        config.level,
        if config.json_format { "JSON" } else { "text" }
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert!(LoggingConfig::production().json_format);
        assert!(LoggingConfig::development().pretty_print);
        assert_eq!(LoggingConfig::test().level, "error");
    }

    #[test]
    fn test_with_env_filter() {
        let config = LoggingConfig::default().with_env_filter("convex_orm=trace");
        assert_eq!(config.env_filter.as_deref(), Some("convex_orm=trace"));
    }
}
