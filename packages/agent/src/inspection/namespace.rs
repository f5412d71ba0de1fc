// packages/agent/src/inspection/namespace.rs
//! Key-value namespaces exposed for browsing
//!
//! Namespaces are owned by the host; the agent only reads, enumerates and
//! deletes keys. The standard namespace also carries the reserved location
//! override keys, which are never listed.

use crate::interception::location::{SIMULATED_LATITUDE_KEY, SIMULATED_LONGITUDE_KEY};
use crate::utils::errors::{AgentError, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Display name of the default namespace
pub const STANDARD_NAMESPACE: &str = "standard";

/// Named mapping from string keys to arbitrary values
pub trait KeyValueNamespace: Send + Sync {
    /// All keys currently present
    fn keys(&self) -> Vec<String>;

    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value);

    /// Remove a key; returns whether it existed
    fn remove(&self, key: &str) -> bool;

    /// Persist pending changes, if the backing store needs it
    fn synchronize(&self) {}
}

/// In-memory namespace
#[derive(Debug, Default)]
pub struct MemoryNamespace {
    values: DashMap<String, Value>,
}

impl MemoryNamespace {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueNamespace for MemoryNamespace {
    fn keys(&self) -> Vec<String> {
        self.values.iter().map(|e| e.key().clone()).collect()
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }
}

/// Resolves namespace names to host namespaces
pub trait NamespaceProvider: Send + Sync {
    /// The default namespace
    fn standard(&self) -> Arc<dyn KeyValueNamespace>;

    /// A named namespace, if the host has one by that name
    fn open(&self, name: &str) -> Option<Arc<dyn KeyValueNamespace>>;
}

/// Provider creating in-memory namespaces on first use
#[derive(Default)]
pub struct MemoryNamespaceProvider {
    standard: Arc<MemoryNamespace>,
    suites: DashMap<String, Arc<MemoryNamespace>>,
}

impl MemoryNamespaceProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NamespaceProvider for MemoryNamespaceProvider {
    fn standard(&self) -> Arc<dyn KeyValueNamespace> {
        self.standard.clone()
    }

    fn open(&self, name: &str) -> Option<Arc<dyn KeyValueNamespace>> {
        let suite: Arc<dyn KeyValueNamespace> = self
            .suites
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryNamespace::new()))
            .clone();
        Some(suite)
    }
}

/// Key and rendered value, as shown in a browser row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    pub key: String,
    pub value: String,
}

/// Namespaces configured for inspection
pub struct NamespaceRegistry {
    provider: Arc<dyn NamespaceProvider>,
    configured: RwLock<Vec<String>>,
}

impl NamespaceRegistry {
    pub fn new(provider: Arc<dyn NamespaceProvider>) -> Self {
        Self {
            provider,
            configured: RwLock::new(Vec::new()),
        }
    }

    /// Replace the list of auxiliary namespaces to expose
    pub fn configure(&self, names: Vec<String>) {
        debug!("Exposing {} auxiliary namespace(s)", names.len());
        *self.configured.write() = names;
    }

    pub fn standard(&self) -> Arc<dyn KeyValueNamespace> {
        self.provider.standard()
    }

    /// Namespaces to offer, in display order.
    ///
    /// Only the standard namespace when nothing was configured; otherwise
    /// "standard" followed by every configured name the host can open.
    pub fn available(&self) -> Vec<String> {
        let mut names = vec![STANDARD_NAMESPACE.to_string()];
        names.extend(
            self.configured
                .read()
                .iter()
                .filter(|name| self.provider.open(name).is_some())
                .cloned(),
        );
        names
    }

    fn is_standard(name: &str) -> bool {
        name.is_empty() || name == STANDARD_NAMESPACE
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn KeyValueNamespace>> {
        if Self::is_standard(name) {
            return Ok(self.provider.standard());
        }

        if !self.configured.read().iter().any(|n| n == name) {
            return Err(AgentError::ConfigError(format!(
                "Namespace {} is not exposed for inspection",
                name
            )));
        }

        self.provider.open(name).ok_or_else(|| {
            AgentError::ConfigError(format!("Namespace {} cannot be opened", name))
        })
    }

    /// Keys shown for a namespace, sorted.
    ///
    /// Reserved override keys are hidden; for non-standard namespaces, keys
    /// also present in the standard namespace are hidden too.
    pub fn list_keys(&self, name: &str) -> Result<Vec<String>> {
        let namespace = self.resolve(name)?;

        let mut keys: Vec<String> = namespace
            .keys()
            .into_iter()
            .filter(|key| key != SIMULATED_LATITUDE_KEY && key != SIMULATED_LONGITUDE_KEY)
            .collect();

        if !Self::is_standard(name) {
            let standard: HashSet<String> = self.provider.standard().keys().into_iter().collect();
            keys.retain(|key| !standard.contains(key));
        }

        keys.sort();
        Ok(keys)
    }

    /// Keys containing `search` (case-insensitive); empty search lists all
    pub fn filter_keys(&self, name: &str, search: &str) -> Result<Vec<String>> {
        let keys = self.list_keys(name)?;
        if search.is_empty() {
            return Ok(keys);
        }

        let needle = search.to_lowercase();
        Ok(keys
            .into_iter()
            .filter(|key| key.to_lowercase().contains(&needle))
            .collect())
    }

    /// Listed keys with their rendered values
    pub fn entries(&self, name: &str) -> Result<Vec<NamespaceEntry>> {
        let namespace = self.resolve(name)?;
        Ok(self
            .list_keys(name)?
            .into_iter()
            .map(|key| {
                let value = match namespace.get(&key) {
                    Some(Value::String(s)) => s,
                    Some(other) => {
                        serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string())
                    }
                    None => String::new(),
                };
                NamespaceEntry { key, value }
            })
            .collect())
    }

    /// Delete one key
    pub fn delete_key(&self, name: &str, key: &str) -> Result<bool> {
        let namespace = self.resolve(name)?;
        let removed = namespace.remove(key);
        namespace.synchronize();
        Ok(removed)
    }

    /// Delete every listed key; hidden keys are left alone
    pub fn clear_namespace(&self, name: &str) -> Result<usize> {
        let namespace = self.resolve(name)?;
        let mut removed = 0;
        for key in self.list_keys(name)? {
            if namespace.remove(&key) {
                removed += 1;
            }
        }
        namespace.synchronize();
        Ok(removed)
    }

    /// Browser title for a namespace
    pub fn title(&self, name: &str) -> String {
        if Self::is_standard(name) && self.configured.read().is_empty() {
            "Key-value store".to_string()
        } else {
            format!("Key-value store ({})", name)
        }
    }
}
