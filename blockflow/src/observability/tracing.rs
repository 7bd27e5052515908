//! Structured logging setup for blockflow graphs.
//!
//! Blocks log through `tracing` macros with `block`, `name` and `stage`
//! fields. This module installs a subscriber for them and opens the span
//! pipeline compilation runs under.

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Include the event target in every line.
    pub with_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

impl TracingConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback filter directives.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Switches JSON output on or off.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Sets whether event targets are printed.
    #[must_use]
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.filter)
                .map_err(|e| anyhow::anyhow!("invalid filter '{}': {e}", self.filter)),
        }
    }
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over [`TracingConfig::filter`].
///
/// # Errors
///
/// Returns an error if the filter does not parse or a global subscriber is
/// already installed.
pub fn init_tracing(config: &TracingConfig) -> anyhow::Result<()> {
    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_target(config.with_target))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(config.with_target))
            .try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Opens the span a pipeline build runs under.
pub fn pipeline_span(pipeline: &str, facade: &'static str) -> Span {
    tracing::debug_span!("pipeline_build", pipeline = %pipeline, facade)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_builders() {
        let config = TracingConfig::new()
            .with_filter("blockflow=debug")
            .with_json(true)
            .with_target(false);
        assert_eq!(config.filter, "blockflow=debug");
        assert!(config.json);
        assert!(!config.with_target);
        assert_eq!(TracingConfig::default().filter, "info");
    }

    #[test]
    fn test_config_deserializes_partially() {
        let config: TracingConfig = serde_json::from_str(r#"{"json": true}"#).unwrap();
        assert!(config.json);
        assert_eq!(config.filter, "info");
    }

    #[test]
    fn test_second_install_fails() {
        let config = TracingConfig::new().with_filter("warn");
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn test_pipeline_span_enters() {
        let span = pipeline_span("orders", "target");
        let _entered = span.enter();
    }
}
