// packages/agent/src/redirect/mod.rs
//! Entry-point redirection
//!
//! Host operations that interceptors observe are published as named entry
//! points in a `RedirectionTable`. An interceptor retargets an entry point to
//! a replacement exactly once; the replacement receives an `Original` handle
//! so it can delegate to the pre-existing behavior.
//!
//! Process hooks that live outside the table (panic hook, signal handlers,
//! descriptor redirection) are installed through `install_hook`, which gives
//! them the same run-once guarantee.
//!
//! # Architecture
//!
//! ```text
//! Host code → table.call("network.send", req)
//!                 │
//!                 ├─ redirected? → replacement(original, req) → original(req)
//!                 └─ otherwise   → original(req)
//! ```
//!
//! There is no uninstall: once installed, a redirection stays for the life of
//! the table.

pub mod entry_point;
pub mod table;

// Re-export commonly used types
pub use entry_point::{EntryPoint, Original};
pub use table::{RedirectionKind, RedirectionRecord, RedirectionTable};
