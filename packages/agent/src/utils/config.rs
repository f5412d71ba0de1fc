// packages/agent/src/utils/config.rs
//! Agent configuration
//!
//! Layered the usual way: built-in defaults, then an optional file named by
//! `PERISCOPE_CONFIG`, then `PERISCOPE__SECTION__KEY` environment variables.

use crate::capture::Domain;
use crate::utils::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "PERISCOPE_CONFIG";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "PERISCOPE";

/// Top-level agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub store: StoreSettings,
    pub network: NetworkSettings,
    pub leak: LeakSettings,
    pub fault: FaultSettings,
    pub console: ConsoleSettings,
    pub log: LogSettings,
}

/// Capture store bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Maximum retained events per domain
    pub max_events: usize,

    /// Per-domain overrides keyed by domain name (e.g. "console")
    pub overrides: HashMap<String, usize>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_events: 1000,
            overrides: HashMap::new(),
        }
    }
}

/// Network interceptor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Maximum body bytes kept per request/response snapshot
    pub max_body_snapshot: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            max_body_snapshot: 10_000, // 10KB
        }
    }
}

/// Lifecycle/leak interceptor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakSettings {
    /// Grace period after disposal before a live object is flagged
    pub threshold_ms: u64,

    /// Interval between periodic liveness checks
    pub check_interval_ms: u64,

    /// Object categories to track (empty = every category)
    pub categories: Vec<String>,

    /// Also append an event for every tracked allocation
    pub record_allocations: bool,
}

impl Default for LeakSettings {
    fn default() -> Self {
        Self {
            threshold_ms: 1000,
            check_interval_ms: 2000,
            categories: vec!["screen".to_string()],
            record_allocations: false,
        }
    }
}

impl LeakSettings {
    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// Fault interceptor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultSettings {
    /// Durable slot holding the last fault report
    pub slot_path: PathBuf,

    /// Install handlers for fatal signals (unix only)
    pub capture_signals: bool,

    /// How long a run must go on after a panic before the report is
    /// marked as survived
    pub survival_grace_ms: u64,
}

impl Default for FaultSettings {
    fn default() -> Self {
        Self {
            slot_path: std::env::temp_dir()
                .join("periscope")
                .join("fault-report.json"),
            capture_signals: true,
            survival_grace_ms: 2000,
        }
    }
}

impl FaultSettings {
    pub fn survival_grace(&self) -> Duration {
        Duration::from_millis(self.survival_grace_ms)
    }
}

/// Console interceptor settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    /// Redirect the process's stdout/stderr descriptors through a pipe
    /// instead of only wrapping the console entry points
    pub capture_fds: bool,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Fallback level when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of the pretty format
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from defaults, optional file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load configuration with an explicit file path
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AgentConfig::default())?);

        if let Some(path) = path {
            if path.exists() {
                info!(path = %path.display(), "Loading agent config file");
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: AgentConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.store.max_events == 0 {
            return Err(AgentError::ConfigError(
                "store.max_events must be greater than 0".to_string(),
            ));
        }

        if let Some((domain, _)) = self.store.overrides.iter().find(|(_, max)| **max == 0) {
            return Err(AgentError::ConfigError(format!(
                "store.overrides.{} must be greater than 0",
                domain
            )));
        }

        if self.leak.check_interval_ms == 0 {
            return Err(AgentError::ConfigError(
                "leak.check_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Retained-event bound for a domain
    pub fn max_events_for(&self, domain: Domain) -> usize {
        self.store
            .overrides
            .get(domain.as_str())
            .copied()
            .unwrap_or(self.store.max_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = AgentConfig::default();
        assert_eq!(config.store.max_events, 1000);
        assert_eq!(config.network.max_body_snapshot, 10_000);
        assert_eq!(config.leak.categories, vec!["screen".to_string()]);
        assert!(!config.console.capture_fds);
        assert_eq!(config.fault.survival_grace(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_domain_override() {
        let mut config = AgentConfig::default();
        config.store.overrides.insert("console".to_string(), 50);

        assert_eq!(config.max_events_for(Domain::Console), 50);
        assert_eq!(config.max_events_for(Domain::Network), 1000);
    }

    #[test]
    fn test_validation() {
        let mut config = AgentConfig::default();
        config.store.max_events = 0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.leak.check_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.store.overrides.insert("fault".to_string(), 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[store]\nmax_events = 42\n\n[leak]\nthreshold_ms = 5\ncategories = []"
        )
        .unwrap();

        let config = AgentConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.store.max_events, 42);
        assert_eq!(config.leak.threshold_ms, 5);
        assert!(config.leak.categories.is_empty());
        assert_eq!(config.network.max_body_snapshot, 10_000);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AgentConfig::load_from(Some(Path::new("/nonexistent/periscope.toml"))).unwrap();
        assert_eq!(config.store.max_events, 1000);
    }
}
