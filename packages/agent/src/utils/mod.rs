// packages/agent/src/utils/mod.rs
//! Shared utilities: error taxonomy and configuration

pub mod config;
pub mod errors;

pub use config::AgentConfig;
pub use errors::{AgentError, Result};
