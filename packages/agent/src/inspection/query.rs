// packages/agent/src/inspection/query.rs
//! Read-side queries over the capture stores

use crate::capture::{CapturedEvent, CaptureStores, Domain, Payload, StoreStats, SubscriptionId};
use crate::inspection::namespace::NamespaceRegistry;
use crate::utils::errors::Result;
use std::sync::Arc;
use tracing::debug;

/// Query surface for the presentation layer
#[derive(Clone)]
pub struct Inspector {
    stores: CaptureStores,
    namespaces: Arc<NamespaceRegistry>,
}

impl Inspector {
    pub fn new(stores: CaptureStores, namespaces: Arc<NamespaceRegistry>) -> Self {
        Self { stores, namespaces }
    }

    /// Events of a domain in presentation order
    pub fn list(&self, domain: Domain) -> Vec<CapturedEvent> {
        self.stores.get(domain).events()
    }

    /// Events whose textual projection contains `needle`, ignoring case
    pub fn filter(&self, domain: Domain, needle: &str) -> Vec<CapturedEvent> {
        self.list(domain)
            .into_iter()
            .filter(|event| event.matches(needle))
            .collect()
    }

    /// Events accepted by an arbitrary predicate
    pub fn filter_by<P>(&self, domain: Domain, predicate: P) -> Vec<CapturedEvent>
    where
        P: Fn(&Payload) -> bool,
    {
        self.list(domain)
            .into_iter()
            .filter(|event| predicate(&event.payload))
            .collect()
    }

    /// Delete the event at a presentation index
    pub fn delete(&self, domain: Domain, index: usize) -> bool {
        self.stores.get(domain).remove_at(index)
    }

    /// Delete the event at `index` of a filtered view.
    ///
    /// Indices shown in a search result refer to the filtered list, so the
    /// event is resolved by ordinal before removal.
    pub fn delete_filtered(&self, domain: Domain, needle: &str, index: usize) -> bool {
        match self.filter(domain, needle).get(index) {
            Some(event) => self.stores.get(domain).remove_id(event.id),
            None => false,
        }
    }

    /// Drop every event of a domain
    pub fn clear(&self, domain: Domain) -> usize {
        let removed = self.stores.get(domain).clear();
        debug!("Cleared {} {} event(s)", removed, domain);
        removed
    }

    /// Drop every event of every domain
    pub fn clear_all(&self) -> usize {
        Domain::ALL.iter().map(|domain| self.clear(*domain)).sum()
    }

    pub fn stats(&self) -> Vec<StoreStats> {
        self.stores.stats()
    }

    /// Subscribe to every console append, for live refresh
    pub fn on_console<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&CapturedEvent) + Send + Sync + 'static,
    {
        self.stores
            .console
            .subscribe(move |captured| callback(&captured.to_event()))
    }

    pub fn stores(&self) -> &CaptureStores {
        &self.stores
    }

    // Key-value namespaces

    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.namespaces
    }

    pub fn available_namespaces(&self) -> Vec<String> {
        self.namespaces.available()
    }

    pub fn list_keys(&self, namespace: &str) -> Result<Vec<String>> {
        self.namespaces.list_keys(namespace)
    }

    pub fn delete_key(&self, namespace: &str, key: &str) -> Result<bool> {
        self.namespaces.delete_key(namespace, key)
    }

    pub fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        self.namespaces.clear_namespace(namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ConsoleLine, StreamTag, UiEvent, UiEventKind};
    use crate::inspection::namespace::{MemoryNamespaceProvider, NamespaceProvider};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn inspector() -> (Inspector, Arc<MemoryNamespaceProvider>) {
        let provider = Arc::new(MemoryNamespaceProvider::new());
        let namespaces = Arc::new(NamespaceRegistry::new(provider.clone()));
        (Inspector::new(CaptureStores::new(100), namespaces), provider)
    }

    fn write(inspector: &Inspector, stream: StreamTag, text: &str, sequence: u64) {
        inspector.stores().console.append(ConsoleLine {
            stream,
            text: text.to_string(),
            sequence,
        });
    }

    #[test]
    fn test_list_and_filter() {
        let (inspector, _) = inspector();
        write(&inspector, StreamTag::Stdout, "Login succeeded", 1);
        write(&inspector, StreamTag::Stderr, "Disk almost full", 2);
        write(&inspector, StreamTag::Stdout, "login retried", 3);

        assert_eq!(inspector.list(Domain::Console).len(), 3);

        let hits = inspector.filter(Domain::Console, "LOGIN");
        assert_eq!(hits.len(), 2);
        assert!(hits[0].id < hits[1].id);

        let errors = inspector.filter_by(Domain::Console, |payload| {
            matches!(payload, Payload::Console(line) if line.stream == StreamTag::Stderr)
        });
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_delete_by_index() {
        let (inspector, _) = inspector();
        write(&inspector, StreamTag::Stdout, "one", 1);
        write(&inspector, StreamTag::Stdout, "two", 2);

        assert!(inspector.delete(Domain::Console, 0));
        assert!(!inspector.delete(Domain::Console, 5));
        let remaining = inspector.list(Domain::Console);
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].matches("two"));
    }

    #[test]
    fn test_delete_filtered_resolves_ordinal() {
        let (inspector, _) = inspector();
        write(&inspector, StreamTag::Stdout, "alpha", 1);
        write(&inspector, StreamTag::Stdout, "beta", 2);
        write(&inspector, StreamTag::Stdout, "alpha again", 3);

        // Index 1 of the "alpha" view is the third event overall
        assert!(inspector.delete_filtered(Domain::Console, "alpha", 1));
        let texts: Vec<bool> = inspector
            .list(Domain::Console)
            .iter()
            .map(|e| e.matches("again"))
            .collect();
        assert_eq!(texts, vec![false, false]);
    }

    #[test]
    fn test_clear_all_empties_every_domain() {
        let (inspector, _) = inspector();
        write(&inspector, StreamTag::Stdout, "line", 1);
        inspector
            .stores()
            .interaction
            .append(UiEvent::new(UiEventKind::Tap, "save"));

        assert_eq!(inspector.clear_all(), 2);
        for domain in Domain::ALL {
            assert!(inspector.list(domain).is_empty());
            assert!(inspector.filter(domain, "anything").is_empty());
        }
    }

    #[test]
    fn test_console_subscription() {
        let (inspector, _) = inspector();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        inspector.on_console(move |event| {
            assert_eq!(event.domain, Domain::Console);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        write(&inspector, StreamTag::Stdout, "hello", 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_namespace_delegation() {
        let (inspector, provider) = inspector();
        inspector
            .namespaces()
            .configure(vec!["group.shared".to_string()]);
        provider.standard().set("a", json!(true));
        let shared = provider.open("group.shared").unwrap();
        shared.set("a", json!(false));
        shared.set("b", json!("x"));

        assert_eq!(
            inspector.available_namespaces(),
            vec!["standard".to_string(), "group.shared".to_string()]
        );
        assert_eq!(
            inspector.list_keys("group.shared").unwrap(),
            vec!["b".to_string()]
        );
        assert!(inspector.delete_key("group.shared", "b").unwrap());
        assert_eq!(inspector.clear_namespace("standard").unwrap(), 1);
    }
}
