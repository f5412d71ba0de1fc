// packages/agent/src/utils/errors.rs
//! Error taxonomy for the diagnostic agent
//!
//! Only setup-time misuse is surfaced to the integrating developer. Capture
//! failures during steady state are logged and swallowed by the interceptor
//! that hit them.

use thiserror::Error;

/// Agent result type
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors produced by the agent
#[derive(Debug, Error)]
pub enum AgentError {
    /// Redirection target is absent or has an incompatible signature
    #[error("Unsupported entry point: {0}")]
    UnsupportedEntryPoint(String),

    /// Registry misuse (setup called twice)
    #[error("Already configured: {0}")]
    AlreadyConfigured(String),

    /// Store at capacity; handled locally by eviction
    #[error("Capture store for {domain} is full ({capacity} events)")]
    CaptureOverflow { domain: String, capacity: usize },

    /// A fault was raised while another fault was being captured
    #[error("Fault raised while handling a fault: {0}")]
    FaultDuringFaultHandling(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Interception failed: {0}")]
    InterceptionFailed(String),

    #[error("Transport failed: {0}")]
    TransportFailed(String),

    #[error("Storage failed: {0}")]
    StorageFailed(String),

    #[error("Observability setup failed: {0}")]
    Observability(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether the error must be surfaced to the integrating developer
    /// rather than degraded locally
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AgentError::AlreadyConfigured(_) | AgentError::ConfigError(_)
        )
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        AgentError::ConfigError(err.to_string())
    }
}
