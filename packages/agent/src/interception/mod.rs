// packages/agent/src/interception/mod.rs
//! Domain interceptors
//!
//! Each interceptor redirects one or more entry points (or installs a process
//! hook) and feeds its capture store:
//!
//! - **Network**: wraps `network.send`, records exchanges, serves mocks
//! - **Lifecycle**: wraps `lifecycle.created`/`lifecycle.disposed`, flags
//!   objects still alive after disposal
//! - **Location**: wraps `location.current`, applies simulated overrides
//! - **Fault**: panic hook and fatal-signal handlers with a durable slot
//! - **Console**: duplicates stdout/stderr writes into console lines
//! - **Interaction**: wraps `ui.dispatch`
//!
//! # Architecture
//!
//! ```text
//! Host call → RedirectionTable → replacement ─┬─ Original (host behavior)
//!                                             └─ CaptureStore::append
//! ```

pub mod console;
pub mod fault;
pub mod fault_slot;
pub mod interaction;
pub mod lifecycle;
pub mod location;
pub mod mock_table;
pub mod network;
#[cfg(unix)]
pub mod stream_redirect;

use crate::redirect::RedirectionTable;
use crate::registry::features::InterceptorId;
use crate::utils::errors::Result;

// Re-export commonly used types
pub use console::{ConsoleInterceptor, ConsoleWriter};
pub use fault::{FaultInterceptor, FaultRecorder};
pub use fault_slot::FaultSlot;
pub use interaction::InteractionInterceptor;
pub use lifecycle::{LifecycleHooks, LifecycleInterceptor, TrackedInstance, WatchHandle};
pub use location::{LocationInterceptor, LocationToolkit};
pub use mock_table::{MockResponse, MockTable};
pub use network::{NetworkClient, NetworkInterceptor, NetworkRequest, NetworkResponse};

/// A domain interceptor that can be enabled against a redirection table
pub trait Interceptor: Send + Sync {
    fn id(&self) -> InterceptorId;

    /// Install the interceptor's redirections.
    ///
    /// Returns `Ok(false)` when everything was already installed. An
    /// `UnsupportedEntryPoint` error means the interceptor must stay inactive.
    fn enable(&self, table: &RedirectionTable) -> Result<bool>;
}
