// packages/agent/src/capture/stores.rs
//! Per-domain store bundle

use crate::capture::event::{Capturable, CapturedEvent, Domain};
use crate::capture::payload::{
    ConsoleLine, FaultReport, LifecycleEvent, LocationQuery, NetworkExchange, UiEvent,
};
use crate::capture::store::{CaptureStore, StoreStats};
use crate::utils::config::AgentConfig;
use std::sync::Arc;

/// Domain-erased view over a capture store
pub trait DomainStore: Send + Sync {
    fn domain(&self) -> Domain;
    fn events(&self) -> Vec<CapturedEvent>;
    fn remove_at(&self, index: usize) -> bool;
    fn remove_id(&self, id: u64) -> bool;
    fn clear(&self) -> usize;
    fn len(&self) -> usize;
    fn stats(&self) -> StoreStats;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Capturable> DomainStore for CaptureStore<T> {
    fn domain(&self) -> Domain {
        T::DOMAIN
    }

    fn events(&self) -> Vec<CapturedEvent> {
        self.snapshot().iter().map(|c| c.to_event()).collect()
    }

    fn remove_at(&self, index: usize) -> bool {
        CaptureStore::remove_at(self, index).is_some()
    }

    fn remove_id(&self, id: u64) -> bool {
        CaptureStore::remove_id(self, id).is_some()
    }

    fn clear(&self) -> usize {
        CaptureStore::clear(self)
    }

    fn len(&self) -> usize {
        CaptureStore::len(self)
    }

    fn stats(&self) -> StoreStats {
        CaptureStore::stats(self)
    }
}

/// One store per domain, shared with the interceptors that feed them
#[derive(Clone)]
pub struct CaptureStores {
    pub network: Arc<CaptureStore<NetworkExchange>>,
    pub lifecycle: Arc<CaptureStore<LifecycleEvent>>,
    pub location: Arc<CaptureStore<LocationQuery>>,
    pub fault: Arc<CaptureStore<FaultReport>>,
    pub console: Arc<CaptureStore<ConsoleLine>>,
    pub interaction: Arc<CaptureStore<UiEvent>>,
}

impl CaptureStores {
    /// Create stores sharing one capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            network: Arc::new(CaptureStore::with_capacity(capacity)),
            lifecycle: Arc::new(CaptureStore::with_capacity(capacity)),
            location: Arc::new(CaptureStore::with_capacity(capacity)),
            fault: Arc::new(CaptureStore::with_capacity(capacity)),
            console: Arc::new(CaptureStore::with_capacity(capacity)),
            interaction: Arc::new(CaptureStore::with_capacity(capacity)),
        }
    }

    /// Create stores honouring per-domain overrides
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            network: Arc::new(CaptureStore::with_capacity(
                config.max_events_for(Domain::Network),
            )),
            lifecycle: Arc::new(CaptureStore::with_capacity(
                config.max_events_for(Domain::Lifecycle),
            )),
            location: Arc::new(CaptureStore::with_capacity(
                config.max_events_for(Domain::Location),
            )),
            fault: Arc::new(CaptureStore::with_capacity(
                config.max_events_for(Domain::Fault),
            )),
            console: Arc::new(CaptureStore::with_capacity(
                config.max_events_for(Domain::Console),
            )),
            interaction: Arc::new(CaptureStore::with_capacity(
                config.max_events_for(Domain::Interaction),
            )),
        }
    }

    /// Domain-erased access to a store
    pub fn get(&self, domain: Domain) -> &dyn DomainStore {
        match domain {
            Domain::Network => &*self.network,
            Domain::Lifecycle => &*self.lifecycle,
            Domain::Location => &*self.location,
            Domain::Fault => &*self.fault,
            Domain::Console => &*self.console,
            Domain::Interaction => &*self.interaction,
        }
    }

    /// Statistics for every domain
    pub fn stats(&self) -> Vec<StoreStats> {
        Domain::ALL.iter().map(|d| self.get(*d).stats()).collect()
    }
}

impl Default for CaptureStores {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::payload::{StreamTag, UiEventKind};

    #[test]
    fn test_stores_from_config() {
        let mut config = AgentConfig::default();
        config.store.overrides.insert("console".to_string(), 3);

        let stores = CaptureStores::from_config(&config);
        assert_eq!(stores.console.capacity(), 3);
        assert_eq!(stores.network.capacity(), 1000);
    }

    #[test]
    fn test_erased_access() {
        let stores = CaptureStores::new(10);
        stores.console.append(ConsoleLine {
            stream: StreamTag::Stderr,
            text: "oops".to_string(),
            sequence: 1,
        });
        stores
            .interaction
            .append(UiEvent::new(UiEventKind::Tap, "login-button"));

        let console = stores.get(Domain::Console);
        assert_eq!(console.domain(), Domain::Console);
        assert_eq!(console.len(), 1);
        assert_eq!(console.events()[0].domain, Domain::Console);

        assert!(stores.get(Domain::Interaction).remove_at(0));
        assert!(stores.get(Domain::Interaction).is_empty());
        assert_eq!(stores.stats().len(), 6);
    }
}
