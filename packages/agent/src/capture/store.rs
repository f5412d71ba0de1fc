// packages/agent/src/capture/store.rs
//! Bounded append-only capture store
//!
//! Mutations are serialized by a single mutex so concurrent appends never
//! interleave and `snapshot()` always sees a consistent prefix. Subscribers
//! run after the lock is released.

use crate::capture::event::{Capturable, CapturedEvent, Domain};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A stored event with its ordinal and capture time
#[derive(Debug)]
pub struct Captured<T> {
    /// Monotonic per-store ordinal, starting at 1
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: Arc<T>,
}

impl<T> Clone for Captured<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            timestamp: self.timestamp,
            payload: Arc::clone(&self.payload),
        }
    }
}

impl<T: Capturable> Captured<T> {
    /// Convert into the domain-tagged event shape
    pub fn to_event(&self) -> CapturedEvent {
        CapturedEvent {
            id: self.id,
            timestamp: self.timestamp,
            domain: T::DOMAIN,
            payload: T::to_payload(&self.payload),
        }
    }
}

/// Handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber<T> = Arc<dyn Fn(&Captured<T>) + Send + Sync>;

struct StoreInner<T> {
    events: VecDeque<Captured<T>>,
    next_id: u64,
}

/// Bounded, thread-safe, append-only event log for one domain
pub struct CaptureStore<T> {
    capacity: usize,
    inner: Mutex<StoreInner<T>>,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber<T>)>>,
    next_subscription: AtomicU64,

    /// Successful appends
    append_count: AtomicU64,

    /// Oldest events dropped at capacity
    evict_count: AtomicU64,

    /// Events removed through `remove_at`/`clear`
    remove_count: AtomicU64,
}

impl<T: Capturable> CaptureStore<T> {
    /// Create a store retaining at most `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(StoreInner {
                events: VecDeque::new(),
                next_id: 1,
            }),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            append_count: AtomicU64::new(0),
            evict_count: AtomicU64::new(0),
            remove_count: AtomicU64::new(0),
        }
    }

    pub fn domain(&self) -> Domain {
        T::DOMAIN
    }

    /// Append an event, evicting the oldest one when at capacity
    pub fn append(&self, payload: T) -> Captured<T> {
        let (captured, evicted) = {
            let mut inner = self.inner.lock();
            let captured = Captured {
                id: inner.next_id,
                timestamp: Utc::now(),
                payload: Arc::new(payload),
            };
            inner.next_id += 1;
            inner.events.push_back(captured.clone());

            let mut evicted = 0;
            while inner.events.len() > self.capacity {
                inner.events.pop_front();
                evicted += 1;
            }
            (captured, evicted)
        };

        self.append_count.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("periscope_events_captured_total", "domain" => T::DOMAIN.as_str())
            .increment(1);

        if evicted > 0 {
            self.evict_count.fetch_add(evicted, Ordering::Relaxed);
            metrics::counter!("periscope_events_evicted_total", "domain" => T::DOMAIN.as_str())
                .increment(evicted);
        }

        self.notify(&captured);
        captured
    }

    fn notify(&self, captured: &Captured<T>) {
        let subscribers: Vec<Subscriber<T>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in subscribers {
            callback(captured);
        }
    }

    /// Ordered copy of the retained events
    pub fn snapshot(&self) -> Vec<Captured<T>> {
        self.inner.lock().events.iter().cloned().collect()
    }

    /// Event at a presentation index
    pub fn get(&self, index: usize) -> Option<Captured<T>> {
        self.inner.lock().events.get(index).cloned()
    }

    /// Register a callback fired after every append
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Captured<T>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription; returns false if it was unknown
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    /// Remove the event at a presentation index
    pub fn remove_at(&self, index: usize) -> Option<Captured<T>> {
        let removed = self.inner.lock().events.remove(index);
        if removed.is_some() {
            self.remove_count.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove the event carrying ordinal `id`
    pub fn remove_id(&self, id: u64) -> Option<Captured<T>> {
        let removed = {
            let mut inner = self.inner.lock();
            let index = inner.events.iter().position(|e| e.id == id);
            index.and_then(|i| inner.events.remove(i))
        };
        if removed.is_some() {
            self.remove_count.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Drop every retained event; ordinals keep increasing afterwards
    pub fn clear(&self) -> usize {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.events.len();
            inner.events.clear();
            removed
        };
        self.remove_count.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            domain: T::DOMAIN,
            append_count: self.append_count.load(Ordering::Relaxed),
            evict_count: self.evict_count.load(Ordering::Relaxed),
            remove_count: self.remove_count.load(Ordering::Relaxed),
            current_size: self.len(),
            capacity: self.capacity,
        }
    }
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub domain: Domain,

    /// Total events appended
    pub append_count: u64,

    /// Total events evicted (capacity reached)
    pub evict_count: u64,

    /// Total events removed by callers
    pub remove_count: u64,

    /// Current retained size
    pub current_size: usize,

    /// Store capacity
    pub capacity: usize,
}

impl StoreStats {
    /// Calculate fill percentage
    pub fn fill_percentage(&self) -> f64 {
        (self.current_size as f64 / self.capacity as f64) * 100.0
    }
}
