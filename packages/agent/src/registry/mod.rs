// packages/agent/src/registry/mod.rs
//! Feature registry and diagnostic context
//!
//! - **Features**: feature/interceptor identifiers, setup options, and the
//!   registry recording what setup decided
//! - **Context**: the process-scoped owner of the table, stores and
//!   interceptors; `setup` enables every interceptor not disabled

pub mod context;
pub mod features;

// Re-export commonly used types
pub use context::DiagnosticContext;
pub use features::{
    AgentOption, FeatureConfig, FeatureId, FeatureRegistry, InterceptorId, InterceptorStatus,
};
