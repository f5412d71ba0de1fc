// packages/agent/src/capture/mod.rs
//! Capture stores
//!
//! One bounded, thread-safe, append-only log per diagnostic domain:
//!
//! - **Store**: generic `CaptureStore<T>` with snapshot/subscribe access
//! - **Event**: the `Domain` tag, `Payload` sum type and `CapturedEvent`
//! - **Payload**: per-domain event shapes (network exchanges, lifecycle
//!   events, location queries, fault reports, console lines, UI events)
//! - **Stores**: the per-domain bundle owned by a diagnostic context
//!
//! # Architecture
//!
//! ```text
//! Interceptor → append() → Mutex<VecDeque> (FIFO eviction at capacity)
//!                               │
//!                               ├─ subscribers (after state update)
//!                               └─ snapshot() → presentation layer
//! ```

pub mod event;
pub mod payload;
pub mod store;
pub mod stores;

// Re-export commonly used types
pub use event::{Capturable, CapturedEvent, Domain, Payload};
pub use payload::{
    BodySnapshot, ConsoleLine, Coordinate, FaultKind, FaultReport, LifecycleEvent,
    LifecycleMarker, LocationQuery, LocationSource, NetworkExchange, RequestSnapshot,
    ResponseSnapshot, StreamTag, UiEvent, UiEventKind,
};
pub use store::{CaptureStore, Captured, StoreStats, SubscriptionId};
pub use stores::{CaptureStores, DomainStore};
