// packages/agent/src/inspection/mod.rs
//! Inspection query layer
//!
//! Read-side API consumed by the presentation layer:
//!
//! - **Query**: list, search, delete and clear captured events per domain
//! - **Namespace**: enumerate and prune external key-value namespaces

pub mod namespace;
pub mod query;

// Re-export commonly used types
pub use namespace::{
    KeyValueNamespace, MemoryNamespace, MemoryNamespaceProvider, NamespaceEntry,
    NamespaceProvider, NamespaceRegistry, STANDARD_NAMESPACE,
};
pub use query::Inspector;
