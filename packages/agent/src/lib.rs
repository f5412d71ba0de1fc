// packages/agent/src/lib.rs
//! Periscope Diagnostic Agent Library
//!
//! An in-process agent that observes a running application without an
//! external debugger. Interceptors redirect host entry points, observe the
//! calls, and feed bounded per-domain capture stores that a presentation
//! layer reads through the inspection API.
//!
//! # Architecture
//!
//! The agent is structured into several key modules:
//!
//! - **redirect**: named entry points redirectable exactly once
//! - **capture**: bounded, thread-safe capture stores per domain
//! - **interception**: network, lifecycle, location, fault, console and UI
//!   interceptors
//! - **registry**: feature registry and the diagnostic context
//! - **inspection**: list/search/delete queries and key-value namespaces
//! - **observability**: tracing and metrics for the agent itself
//! - **utils**: configuration and errors

// Public module exports
pub mod capture;
pub mod inspection;
pub mod interception;
pub mod observability;
pub mod redirect;
pub mod registry;
pub mod utils;

#[cfg(test)]
mod test_support;

use once_cell::sync::OnceCell;
use std::sync::Arc;

// Re-export commonly used types
pub use capture::{CapturedEvent, Domain, Payload};
pub use inspection::Inspector;
pub use redirect::RedirectionTable;
pub use registry::{AgentOption, DiagnosticContext, FeatureId, InterceptorId, InterceptorStatus};
pub use utils::config::AgentConfig;
pub use utils::errors::{AgentError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

static AGENT: OnceCell<DiagnosticContext> = OnceCell::new();

/// Process-wide redirection table; hosts register entry points here before
/// calling `setup`
pub fn table() -> Arc<RedirectionTable> {
    RedirectionTable::global()
}

/// Set up the process-wide agent with configuration from the environment
pub fn setup(
    hide_features: impl IntoIterator<Item = FeatureId>,
    disable_interceptors: impl IntoIterator<Item = InterceptorId>,
    options: Vec<AgentOption>,
) -> Result<&'static DiagnosticContext> {
    setup_with_config(
        AgentConfig::load()?,
        hide_features,
        disable_interceptors,
        options,
    )
}

/// Set up the process-wide agent with an explicit configuration.
///
/// Any call after the first returns `AlreadyConfigured`.
pub fn setup_with_config(
    config: AgentConfig,
    hide_features: impl IntoIterator<Item = FeatureId>,
    disable_interceptors: impl IntoIterator<Item = InterceptorId>,
    options: Vec<AgentOption>,
) -> Result<&'static DiagnosticContext> {
    let context = AGENT.get_or_init(|| {
        DiagnosticContext::with_parts(
            config,
            RedirectionTable::global(),
            Arc::new(inspection::MemoryNamespaceProvider::new()),
        )
    });
    context.setup(hide_features, disable_interceptors, options)?;
    Ok(context)
}

/// Former name of `setup`
#[deprecated(note = "use `setup`")]
pub fn configure(
    hide_features: impl IntoIterator<Item = FeatureId>,
    disable_interceptors: impl IntoIterator<Item = InterceptorId>,
    options: Vec<AgentOption>,
) -> Result<&'static DiagnosticContext> {
    setup(hide_features, disable_interceptors, options)
}

/// The process-wide agent, once set up
pub fn agent() -> Option<&'static DiagnosticContext> {
    AGENT.get().filter(|context| context.registry().is_configured())
}

/// Agent build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = BuildInfo::current();
        assert!(!info.version.is_empty());
        assert!(!info.git_hash.is_empty());
    }

    #[test]
    #[allow(deprecated)]
    fn test_global_setup_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentConfig::default();
        config.fault.slot_path = dir.path().join("fault.json");

        // Leave the test harness's process hooks and streams alone
        let context = setup_with_config(config, [], InterceptorId::ALL, Vec::new()).unwrap();
        assert!(agent().is_some());
        assert!(Arc::ptr_eq(context.table(), &table()));

        assert!(matches!(
            configure([], [], Vec::new()),
            Err(AgentError::AlreadyConfigured(_))
        ));
    }
}
