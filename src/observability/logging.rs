//! Structured logging.
//!
//! # Responsibilities
//! - Install the process-wide subscriber (entry point only)
//! - Pick JSON or human-readable output
//! - Resolve the filter from `RUST_LOG`, then configuration
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `--debug` overrides the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Filter directive for the given settings.
pub fn filter_directive(config: &ObservabilityConfig, debug: bool) -> String {
    if debug {
        "debug".to_string()
    } else {
        config.log_level.clone()
    }
}

/// Install the global subscriber. Call once, from `main`.
pub fn init_logging(config: &ObservabilityConfig, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(config, debug)))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        let config = ObservabilityConfig::default();
        assert_eq!(filter_directive(&config, false), "info");
        assert_eq!(filter_directive(&config, true), "debug");
    }
}
