// packages/agent/src/interception/interaction.rs
//! UI-event interceptor

use crate::capture::{CaptureStore, UiEvent};
use crate::interception::Interceptor;
use crate::redirect::{Original, RedirectionTable};
use crate::registry::features::InterceptorId;
use crate::utils::errors::Result;
use std::sync::Arc;

/// Entry point through which the host dispatches UI events
pub const DISPATCH_ENTRY_POINT: &str = "ui.dispatch";

/// Records every UI event after the host has handled it
#[derive(Clone)]
pub struct InteractionInterceptor {
    store: Arc<CaptureStore<UiEvent>>,
}

impl InteractionInterceptor {
    pub fn new(store: Arc<CaptureStore<UiEvent>>) -> Self {
        Self { store }
    }
}

impl Interceptor for InteractionInterceptor {
    fn id(&self) -> InterceptorId {
        InterceptorId::Views
    }

    fn enable(&self, table: &RedirectionTable) -> Result<bool> {
        let store = Arc::clone(&self.store);
        table.install(
            DISPATCH_ENTRY_POINT,
            InterceptorId::Views.as_str(),
            move |original: &Original<UiEvent, ()>, event: UiEvent| {
                original.call(event.clone());
                store.append(event);
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::UiEventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_events_reach_host_and_store() {
        let table = RedirectionTable::new();
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        table
            .register(DISPATCH_ENTRY_POINT, move |_: UiEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let store = Arc::new(CaptureStore::with_capacity(10));
        let interceptor = InteractionInterceptor::new(Arc::clone(&store));
        assert!(interceptor.enable(&table).unwrap());

        table
            .call::<UiEvent, ()>(
                DISPATCH_ENTRY_POINT,
                UiEvent::new(UiEventKind::Tap, "checkout").at(120.0, 48.5),
            )
            .unwrap();

        assert_eq!(handled.load(Ordering::SeqCst), 1);
        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].payload.target, "checkout");
        assert_eq!(snapshot[0].payload.position, Some((120.0, 48.5)));
    }
}
