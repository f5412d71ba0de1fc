// packages/agent/src/observability/mod.rs
//! Logging and metrics for the agent itself
//!
//! - **Tracing**: `tracing-subscriber` with an env filter and a pretty or
//!   JSON formatter
//! - **Metrics**: Prometheus recorder for capture/eviction/install counters

use crate::utils::config::LogSettings;
use crate::utils::errors::{AgentError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing; `RUST_LOG` wins over the configured level
pub fn init_tracing(settings: &LogSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| AgentError::Observability(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    if settings.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .map_err(|e| AgentError::Observability(e.to_string()))
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(true))
            .try_init()
            .map_err(|e| AgentError::Observability(e.to_string()))
    }
}

/// Install the Prometheus metrics recorder and return its render handle
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AgentError::Observability(format!("Failed to install metrics recorder: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_reported() {
        let settings = LogSettings::default();
        let _ = init_tracing(&settings);

        assert!(matches!(
            init_tracing(&settings),
            Err(AgentError::Observability(_))
        ));
    }
}
