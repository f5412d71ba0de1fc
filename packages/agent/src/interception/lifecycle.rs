// packages/agent/src/interception/lifecycle.rs
//! Lifecycle and leak interceptor
//!
//! Hosts report object creation and disposal through two entry points. The
//! retained-instance table keeps only `Weak` references, so tracking never
//! extends an object's lifetime. A liveness pass flags objects that are still
//! alive once the grace period after their disposal has passed.

use crate::capture::{CaptureStore, Captured, LifecycleEvent, LifecycleMarker};
use crate::interception::Interceptor;
use crate::redirect::{Original, RedirectionTable};
use crate::registry::features::InterceptorId;
use crate::utils::config::LeakSettings;
use crate::utils::errors::{AgentError, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, tick, Sender};
use dashmap::DashMap;
use std::any::Any;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Entry point called when the host creates a trackable object
pub const CREATED_ENTRY_POINT: &str = "lifecycle.created";

/// Entry point called when the host expects an object to go away
pub const DISPOSED_ENTRY_POINT: &str = "lifecycle.disposed";

/// Identity of a tracked object
pub type ObjectId = u64;

/// Non-owning reference handed to `lifecycle.created`
#[derive(Clone)]
pub struct TrackedRef {
    pub id: ObjectId,
    pub category: String,
    pub label: String,
    pub handle: Weak<dyn Any + Send + Sync>,
}

impl TrackedRef {
    pub fn new<T: Any + Send + Sync>(
        category: impl Into<String>,
        label: impl Into<String>,
        object: &Arc<T>,
    ) -> Self {
        let handle: Weak<T> = Arc::downgrade(object);
        let handle: Weak<dyn Any + Send + Sync> = handle;
        Self {
            id: object_id(object),
            category: category.into(),
            label: label.into(),
            handle,
        }
    }
}

/// Identity used for an object behind an `Arc`
pub fn object_id<T>(object: &Arc<T>) -> ObjectId {
    Arc::as_ptr(object) as *const () as usize as ObjectId
}

struct Retained {
    category: String,
    label: String,
    handle: Weak<dyn Any + Send + Sync>,
    first_seen: DateTime<Utc>,
    first_seen_at: Instant,
    disposed_at: Option<Instant>,
    flagged: bool,
}

impl Retained {
    fn event(&self, object_id: ObjectId, marker: LifecycleMarker) -> LifecycleEvent {
        LifecycleEvent {
            object_id,
            category: self.category.clone(),
            label: self.label.clone(),
            marker,
            first_seen: self.first_seen,
            deallocated: marker == LifecycleMarker::Deallocated,
            alive_for_ms: self.first_seen_at.elapsed().as_millis() as u64,
        }
    }
}

/// Snapshot of one retained-instance table entry
#[derive(Debug, Clone)]
pub struct TrackedInstance {
    pub object_id: ObjectId,
    pub category: String,
    pub label: String,
    pub first_seen: DateTime<Utc>,
    pub disposed: bool,
    pub alive: bool,
    pub flagged: bool,
}

struct LeakState {
    store: Arc<CaptureStore<LifecycleEvent>>,
    retained: DashMap<ObjectId, Retained>,
    settings: LeakSettings,
}

impl LeakState {
    fn tracks(&self, category: &str) -> bool {
        self.settings.categories.is_empty() || self.settings.categories.iter().any(|c| c == category)
    }

    fn created(&self, tracked: TrackedRef) {
        if !self.tracks(&tracked.category) {
            return;
        }

        let retained = Retained {
            category: tracked.category,
            label: tracked.label,
            handle: tracked.handle,
            first_seen: Utc::now(),
            first_seen_at: Instant::now(),
            disposed_at: None,
            flagged: false,
        };
        let allocated = retained.event(tracked.id, LifecycleMarker::Allocated);
        self.retained.insert(tracked.id, retained);

        if self.settings.record_allocations {
            self.store.append(allocated);
        }
    }

    fn disposed(&self, id: ObjectId) {
        if let Some(mut retained) = self.retained.get_mut(&id) {
            retained.disposed_at = Some(Instant::now());
        }
    }

    fn check(&self) -> Vec<Captured<LifecycleEvent>> {
        let threshold = self.settings.threshold();
        let mut events = Vec::new();
        let mut dead = Vec::new();

        for mut entry in self.retained.iter_mut() {
            let id = *entry.key();
            let retained = entry.value_mut();

            if retained.handle.strong_count() == 0 {
                if retained.flagged || self.settings.record_allocations {
                    events.push(retained.event(id, LifecycleMarker::Deallocated));
                }
                dead.push(id);
                continue;
            }

            let overdue = retained
                .disposed_at
                .map(|at| at.elapsed() >= threshold)
                .unwrap_or(false);
            if overdue && !retained.flagged {
                retained.flagged = true;
                warn!(
                    "Possible leak: {} {} still alive after disposal",
                    retained.category, retained.label
                );
                events.push(retained.event(id, LifecycleMarker::PossibleLeak));
            }
        }

        for id in dead {
            self.retained.remove(&id);
        }

        let leaks = events
            .iter()
            .filter(|e| e.marker == LifecycleMarker::PossibleLeak)
            .count();
        if leaks > 0 {
            metrics::counter!("periscope_possible_leaks_total").increment(leaks as u64);
        }

        events.into_iter().map(|e| self.store.append(e)).collect()
    }
}

/// Lifecycle/leak interceptor
#[derive(Clone)]
pub struct LifecycleInterceptor {
    state: Arc<LeakState>,
}

impl LifecycleInterceptor {
    pub fn new(store: Arc<CaptureStore<LifecycleEvent>>, settings: LeakSettings) -> Self {
        Self {
            state: Arc::new(LeakState {
                store,
                retained: DashMap::new(),
                settings,
            }),
        }
    }

    /// Run one liveness pass; returns the events it appended
    pub fn check_now(&self) -> Vec<Captured<LifecycleEvent>> {
        self.state.check()
    }

    /// Current retained-instance table
    pub fn tracked(&self) -> Vec<TrackedInstance> {
        let mut instances: Vec<TrackedInstance> = self
            .state
            .retained
            .iter()
            .map(|entry| {
                let retained = entry.value();
                TrackedInstance {
                    object_id: *entry.key(),
                    category: retained.category.clone(),
                    label: retained.label.clone(),
                    first_seen: retained.first_seen,
                    disposed: retained.disposed_at.is_some(),
                    alive: retained.handle.strong_count() > 0,
                    flagged: retained.flagged,
                }
            })
            .collect();
        instances.sort_by_key(|i| i.first_seen);
        instances
    }

    /// Run liveness passes every `interval` on a background thread
    pub fn start_watch(&self, interval: Duration) -> Result<WatchHandle> {
        let state = Arc::clone(&self.state);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(interval);

        let thread = thread::Builder::new()
            .name("periscope-leak-watch".to_string())
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => {
                        state.check();
                    }
                    recv(stop_rx) -> _ => break,
                }
            })
            .map_err(|e| AgentError::InterceptionFailed(format!("Leak watcher: {}", e)))?;

        info!("Leak watcher running every {:?}", interval);
        Ok(WatchHandle {
            stop: stop_tx,
            thread: Some(thread),
        })
    }
}

impl Interceptor for LifecycleInterceptor {
    fn id(&self) -> InterceptorId {
        InterceptorId::Leaks
    }

    fn enable(&self, table: &RedirectionTable) -> Result<bool> {
        let owner = InterceptorId::Leaks.as_str();

        let state = Arc::clone(&self.state);
        let created = table.install(
            CREATED_ENTRY_POINT,
            owner,
            move |original: &Original<TrackedRef, ()>, tracked: TrackedRef| {
                original.call(tracked.clone());
                state.created(tracked);
            },
        )?;

        let state = Arc::clone(&self.state);
        let disposed = table.install(
            DISPOSED_ENTRY_POINT,
            owner,
            move |original: &Original<ObjectId, ()>, id: ObjectId| {
                original.call(id);
                state.disposed(id);
            },
        )?;

        Ok(created || disposed)
    }
}

/// Stops the background leak watcher when stopped or dropped
pub struct WatchHandle {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Leak watcher thread panicked");
            }
            debug!("Leak watcher stopped");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Host-side helpers for reporting object lifecycle
#[derive(Clone)]
pub struct LifecycleHooks {
    table: Arc<RedirectionTable>,
}

impl LifecycleHooks {
    pub fn new(table: Arc<RedirectionTable>) -> Self {
        Self { table }
    }

    /// Report a newly created object
    pub fn created<T: Any + Send + Sync>(
        &self,
        category: &str,
        label: &str,
        object: &Arc<T>,
    ) -> Result<ObjectId> {
        let tracked = TrackedRef::new(category, label, object);
        let id = tracked.id;
        self.table.call::<TrackedRef, ()>(CREATED_ENTRY_POINT, tracked)?;
        Ok(id)
    }

    /// Report that an object should be released soon
    pub fn disposed<T>(&self, object: &Arc<T>) -> Result<()> {
        self.table
            .call::<ObjectId, ()>(DISPOSED_ENTRY_POINT, object_id(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Screen {
        _name: String,
    }

    fn screen(name: &str) -> Arc<Screen> {
        Arc::new(Screen {
            _name: name.to_string(),
        })
    }

    fn settings(threshold_ms: u64) -> LeakSettings {
        LeakSettings {
            threshold_ms,
            ..LeakSettings::default()
        }
    }

    fn setup(settings: LeakSettings) -> (LifecycleHooks, LifecycleInterceptor, Arc<CaptureStore<LifecycleEvent>>) {
        let table = Arc::new(RedirectionTable::new());
        table.register(CREATED_ENTRY_POINT, |_: TrackedRef| ()).unwrap();
        table.register(DISPOSED_ENTRY_POINT, |_: ObjectId| ()).unwrap();

        let store = Arc::new(CaptureStore::with_capacity(100));
        let interceptor = LifecycleInterceptor::new(Arc::clone(&store), settings);
        assert!(interceptor.enable(&table).unwrap());
        (LifecycleHooks::new(table), interceptor, store)
    }

    #[test]
    fn test_tracking_does_not_extend_lifetime() {
        let (hooks, interceptor, _) = setup(settings(0));
        let object = screen("settings");
        let weak = Arc::downgrade(&object);

        hooks.created("screen", "SettingsScreen", &object).unwrap();
        assert_eq!(interceptor.tracked().len(), 1);

        drop(object);
        assert!(weak.upgrade().is_none());
        assert!(!interceptor.tracked()[0].alive);
    }

    #[test]
    fn test_live_object_after_disposal_flagged_once() {
        let (hooks, interceptor, store) = setup(settings(0));
        let object = screen("profile");

        hooks.created("screen", "ProfileScreen", &object).unwrap();
        hooks.disposed(&object).unwrap();

        let events = interceptor.check_now();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload.marker, LifecycleMarker::PossibleLeak);
        assert_eq!(events[0].payload.label, "ProfileScreen");

        // Already flagged
        assert!(interceptor.check_now().is_empty());

        // A late release is recorded and the entry leaves the table
        drop(object);
        let events = interceptor.check_now();
        assert_eq!(events[0].payload.marker, LifecycleMarker::Deallocated);
        assert!(events[0].payload.deallocated);
        assert!(interceptor.tracked().is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_released_object_not_flagged() {
        let (hooks, interceptor, store) = setup(settings(0));
        let object = screen("home");

        hooks.created("screen", "HomeScreen", &object).unwrap();
        hooks.disposed(&object).unwrap();
        drop(object);

        assert!(interceptor.check_now().is_empty());
        assert!(store.is_empty());
        assert!(interceptor.tracked().is_empty());
    }

    #[test]
    fn test_threshold_and_undisposed_objects() {
        let (hooks, interceptor, _) = setup(settings(60_000));
        let disposed = screen("a");
        let active = screen("b");

        hooks.created("screen", "A", &disposed).unwrap();
        hooks.created("screen", "B", &active).unwrap();
        hooks.disposed(&disposed).unwrap();

        // Within the grace period, and never disposed
        assert!(interceptor.check_now().is_empty());
    }

    #[test]
    fn test_untracked_category_ignored() {
        let (hooks, interceptor, _) = setup(settings(0));
        let cache = Arc::new(vec![1u8, 2, 3]);

        hooks.created("cache", "ImageCache", &cache).unwrap();
        assert!(interceptor.tracked().is_empty());
    }

    #[test]
    fn test_record_allocations() {
        let (hooks, _, store) = setup(LeakSettings {
            record_allocations: true,
            ..settings(0)
        });
        let object = screen("x");
        hooks.created("screen", "X", &object).unwrap();

        assert_eq!(store.snapshot()[0].payload.marker, LifecycleMarker::Allocated);
    }

    #[test]
    fn test_watch_flags_in_background() {
        let (hooks, interceptor, store) = setup(settings(0));
        let object = screen("leaky");
        hooks.created("screen", "LeakyScreen", &object).unwrap();
        hooks.disposed(&object).unwrap();

        let handle = interceptor.start_watch(Duration::from_millis(10)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while store.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        handle.stop();

        assert_eq!(store.len(), 1);
        drop(object);
    }
}
