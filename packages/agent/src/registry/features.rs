// packages/agent/src/registry/features.rs
//! Feature and interceptor identifiers and the feature registry

use crate::capture::Domain;
use crate::utils::errors::{AgentError, Result};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// Presentation features that can be hidden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureId {
    Network,
    Performance,
    Interface,
    Resources,
    App,
}

impl FeatureId {
    pub const ALL: [FeatureId; 5] = [
        FeatureId::Network,
        FeatureId::Performance,
        FeatureId::Interface,
        FeatureId::Resources,
        FeatureId::App,
    ];
}

/// Interceptors that can be disabled at setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptorId {
    Network,
    Location,
    Views,
    Fault,
    Leaks,
    Console,
}

impl InterceptorId {
    pub const ALL: [InterceptorId; 6] = [
        InterceptorId::Network,
        InterceptorId::Location,
        InterceptorId::Views,
        InterceptorId::Fault,
        InterceptorId::Leaks,
        InterceptorId::Console,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterceptorId::Network => "network",
            InterceptorId::Location => "location",
            InterceptorId::Views => "views",
            InterceptorId::Fault => "fault",
            InterceptorId::Leaks => "leaks",
            InterceptorId::Console => "console",
        }
    }

    /// Capture store fed by this interceptor
    pub fn domain(&self) -> Domain {
        match self {
            InterceptorId::Network => Domain::Network,
            InterceptorId::Location => Domain::Location,
            InterceptorId::Views => Domain::Interaction,
            InterceptorId::Fault => Domain::Fault,
            InterceptorId::Leaks => Domain::Lifecycle,
            InterceptorId::Console => Domain::Console,
        }
    }
}

impl fmt::Display for InterceptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra setup options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOption {
    /// Auxiliary key-value namespaces to expose for inspection
    KeyValueNamespaces(Vec<String>),

    /// Hide the floating trigger
    HideFloatingTrigger,
}

/// Configuration fixed at setup
#[derive(Debug, Clone, Default)]
pub struct FeatureConfig {
    pub hidden_features: BTreeSet<FeatureId>,
    pub disabled_interceptors: BTreeSet<InterceptorId>,
    pub options: Vec<AgentOption>,
}

impl FeatureConfig {
    pub fn new(
        hidden_features: impl IntoIterator<Item = FeatureId>,
        disabled_interceptors: impl IntoIterator<Item = InterceptorId>,
        options: Vec<AgentOption>,
    ) -> Self {
        Self {
            hidden_features: hidden_features.into_iter().collect(),
            disabled_interceptors: disabled_interceptors.into_iter().collect(),
            options,
        }
    }

    /// All interceptors minus the disabled ones
    pub fn active_interceptors(&self) -> Vec<InterceptorId> {
        InterceptorId::ALL
            .iter()
            .copied()
            .filter(|id| !self.disabled_interceptors.contains(id))
            .collect()
    }

    /// Namespaces named by every `KeyValueNamespaces` option, in order
    pub fn namespace_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for option in &self.options {
            if let AgentOption::KeyValueNamespaces(list) = option {
                for name in list {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
        names
    }

    pub fn hides_floating_trigger(&self) -> bool {
        self.options
            .iter()
            .any(|o| matches!(o, AgentOption::HideFloatingTrigger))
    }
}

/// Outcome of enabling an interceptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptorStatus {
    /// Redirections installed
    Active,

    /// Turned off at setup
    Disabled,

    /// Enabling failed; the rest of the agent is unaffected
    Inactive { reason: String },
}

impl InterceptorStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, InterceptorStatus::Active)
    }
}

/// Process-scoped record of what setup decided
pub struct FeatureRegistry {
    config: OnceCell<FeatureConfig>,
    statuses: RwLock<BTreeMap<InterceptorId, InterceptorStatus>>,
    launched_at: Instant,
    configured_at: OnceCell<Instant>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self {
            config: OnceCell::new(),
            statuses: RwLock::new(BTreeMap::new()),
            launched_at: Instant::now(),
            configured_at: OnceCell::new(),
        }
    }

    /// Fix the configuration; a second call is `AlreadyConfigured`
    pub fn configure(&self, config: FeatureConfig) -> Result<&FeatureConfig> {
        self.config
            .set(config)
            .map_err(|_| AgentError::AlreadyConfigured("setup was already called".to_string()))?;
        let _ = self.configured_at.set(Instant::now());

        let config = self.config()?;
        info!(
            "Feature registry configured: {} hidden feature(s), {} disabled interceptor(s)",
            config.hidden_features.len(),
            config.disabled_interceptors.len()
        );
        Ok(config)
    }

    pub fn is_configured(&self) -> bool {
        self.config.get().is_some()
    }

    pub fn config(&self) -> Result<&FeatureConfig> {
        self.config
            .get()
            .ok_or_else(|| AgentError::ConfigError("setup has not been called".to_string()))
    }

    pub(crate) fn set_status(&self, id: InterceptorId, status: InterceptorStatus) {
        self.statuses.write().insert(id, status);
    }

    /// Status of an interceptor; `Disabled` before setup
    pub fn status(&self, id: InterceptorId) -> InterceptorStatus {
        self.statuses
            .read()
            .get(&id)
            .cloned()
            .unwrap_or(InterceptorStatus::Disabled)
    }

    pub fn statuses(&self) -> BTreeMap<InterceptorId, InterceptorStatus> {
        self.statuses.read().clone()
    }

    pub fn is_hidden(&self, feature: FeatureId) -> bool {
        self.config
            .get()
            .map(|c| c.hidden_features.contains(&feature))
            .unwrap_or(false)
    }

    /// Features to present, in display order
    pub fn visible_features(&self) -> Vec<FeatureId> {
        FeatureId::ALL
            .iter()
            .copied()
            .filter(|f| !self.is_hidden(*f))
            .collect()
    }

    pub fn floating_trigger_hidden(&self) -> bool {
        self.config
            .get()
            .map(|c| c.hides_floating_trigger())
            .unwrap_or(false)
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.config
            .get()
            .map(|c| c.namespace_names())
            .unwrap_or_default()
    }

    /// Time from context creation to setup
    pub fn startup_duration(&self) -> Option<Duration> {
        self.configured_at
            .get()
            .map(|at| at.duration_since(self.launched_at))
    }
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::new()
    }
}
