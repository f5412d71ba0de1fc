// packages/agent/src/redirect/table.rs
//! Redirection table mapping entry point names to implementations
//!
//! The table is an ordinary value so tests can build isolated contexts; the
//! process-wide agent uses `RedirectionTable::global()`.

use crate::redirect::entry_point::{EntryPoint, Original};
use crate::utils::errors::{AgentError, Result};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

static GLOBAL_TABLE: Lazy<Arc<RedirectionTable>> = Lazy::new(|| Arc::new(RedirectionTable::new()));

/// How a redirection was installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectionKind {
    /// Replacement wrapped around a registered entry point
    Wrapped,

    /// Process hook installed outside the table
    Hook,
}

/// Record of an installed redirection
#[derive(Debug, Clone)]
pub struct RedirectionRecord {
    /// Entry point name (e.g., "network.send")
    pub entry_point: String,

    /// Interceptor that installed it
    pub owner: String,

    pub kind: RedirectionKind,
    pub installed_at: DateTime<Utc>,
}

struct RegisteredEntry {
    signature: &'static str,
    entry: Arc<dyn Any + Send + Sync>,
}

/// Named entry points and the redirections installed on them
pub struct RedirectionTable {
    entries: DashMap<String, RegisteredEntry>,
    hooks: Mutex<HashSet<String>>,
    records: RwLock<Vec<RedirectionRecord>>,
}

impl RedirectionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hooks: Mutex::new(HashSet::new()),
            records: RwLock::new(Vec::new()),
        }
    }

    /// Process-wide table
    pub fn global() -> Arc<RedirectionTable> {
        Arc::clone(&GLOBAL_TABLE)
    }

    fn signature<A: 'static, R: 'static>() -> &'static str {
        std::any::type_name::<fn(A) -> R>()
    }

    /// Publish a host entry point with its original implementation.
    ///
    /// Registering an existing name with the same signature returns the
    /// existing entry point untouched.
    pub fn register<A, R, F>(&self, id: &str, original: F) -> Result<Arc<EntryPoint<A, R>>>
    where
        A: 'static,
        R: 'static,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(existing) => Self::downcast(id, existing.get()),
            Entry::Vacant(slot) => {
                let entry = Arc::new(EntryPoint::new(id, original));
                slot.insert(RegisteredEntry {
                    signature: Self::signature::<A, R>(),
                    entry: entry.clone() as Arc<dyn Any + Send + Sync>,
                });
                debug!("Registered entry point {}", id);
                Ok(entry)
            }
        }
    }

    fn downcast<A: 'static, R: 'static>(
        id: &str,
        registered: &RegisteredEntry,
    ) -> Result<Arc<EntryPoint<A, R>>> {
        Arc::clone(&registered.entry)
            .downcast::<EntryPoint<A, R>>()
            .map_err(|_| {
                AgentError::UnsupportedEntryPoint(format!(
                    "{} has signature {}, requested {}",
                    id,
                    registered.signature,
                    Self::signature::<A, R>()
                ))
            })
    }

    /// Look up a registered entry point
    pub fn entry<A: 'static, R: 'static>(&self, id: &str) -> Result<Arc<EntryPoint<A, R>>> {
        let registered = self.entries.get(id).ok_or_else(|| {
            AgentError::UnsupportedEntryPoint(format!("{} is not registered", id))
        })?;
        Self::downcast(id, registered.value())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Redirect an entry point to `replacement`.
    ///
    /// Returns `Ok(false)` without side effects if the entry point is already
    /// redirected, and `UnsupportedEntryPoint` if it is absent.
    pub fn install<A, R, F>(&self, id: &str, owner: &str, replacement: F) -> Result<bool>
    where
        A: 'static,
        R: 'static,
        F: Fn(&Original<A, R>, A) -> R + Send + Sync + 'static,
    {
        let entry = self.entry::<A, R>(id)?;

        if !entry.redirect(replacement) {
            debug!("Entry point {} already redirected, skipping", id);
            return Ok(false);
        }

        self.record(id, owner, RedirectionKind::Wrapped);
        Ok(true)
    }

    /// Run a process-hook installer at most once per table.
    ///
    /// The installer runs under the table's hook lock, so concurrent
    /// installs of the same hook cannot both run it.
    pub fn install_hook<F>(&self, id: &str, owner: &str, installer: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut hooks = self.hooks.lock();
        if hooks.contains(id) {
            debug!("Hook {} already installed, skipping", id);
            return Ok(false);
        }

        installer()?;
        hooks.insert(id.to_string());
        drop(hooks);

        self.record(id, owner, RedirectionKind::Hook);
        Ok(true)
    }

    fn record(&self, id: &str, owner: &str, kind: RedirectionKind) {
        info!("Installed {:?} redirection on {} for {}", kind, id, owner);
        metrics::counter!("periscope_redirections_installed_total").increment(1);

        self.records.write().push(RedirectionRecord {
            entry_point: id.to_string(),
            owner: owner.to_string(),
            kind,
            installed_at: Utc::now(),
        });
    }

    /// Call through an entry point
    pub fn call<A: 'static, R: 'static>(&self, id: &str, args: A) -> Result<R> {
        Ok(self.entry::<A, R>(id)?.call(args))
    }

    /// Call the original implementation, bypassing any redirection
    pub fn invoke_original<A: 'static, R: 'static>(&self, id: &str, args: A) -> Result<R> {
        Ok(self.entry::<A, R>(id)?.original().call(args))
    }

    /// Whether an entry point or hook has an active redirection
    pub fn is_installed(&self, id: &str) -> bool {
        self.records.read().iter().any(|r| r.entry_point == id)
    }

    /// All installed redirections, in install order
    pub fn records(&self) -> Vec<RedirectionRecord> {
        self.records.read().clone()
    }

    /// Names of all registered entry points
    pub fn entry_points(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for RedirectionTable {
    fn default() -> Self {
        Self::new()
    }
}
