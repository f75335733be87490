//! Lifecycle Notifications
//!
//! Observer list for data manager events. Listeners run synchronously on the
//! emitting task, in the order they subscribed.

use crate::domain::entities::CacheSnapshot;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Data manager lifecycle event.
#[derive(Debug, Clone)]
pub enum DataEvent {
    /// A load succeeded and this snapshot is now current
    DataLoaded(Arc<CacheSnapshot>),
    /// A load failed; the previous snapshot (if any) is still current
    DataLoadFailed(Vec<String>),
    /// The data source changed on disk
    FileChanged,
}

impl DataEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DataEvent::DataLoaded(_) => "dataLoaded",
            DataEvent::DataLoadFailed(_) => "dataLoadFailed",
            DataEvent::FileChanged => "fileChanged",
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&DataEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&DataEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Deliver `event` to every current listener before returning.
    pub fn emit(&self, event: &DataEvent) {
        // Snapshot the list so listeners may (un)subscribe re-entrantly.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        tracing::trace!(event = event.name(), listeners = listeners.len(), "emitting event");
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_delivery_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.subscribe(move |_| seen.lock().push(tag));
        }

        bus.emit(&DataEvent::FileChanged);
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_dispatch_is_synchronous() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&DataEvent::DataLoadFailed(vec!["bad".to_string()]));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let id = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&DataEvent::FileChanged);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_listener_can_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let bus_ref = bus.clone();
        let slot_ref = slot.clone();
        let id = bus.subscribe(move |_| {
            if let Some(id) = *slot_ref.lock() {
                bus_ref.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        bus.emit(&DataEvent::FileChanged);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(DataEvent::FileChanged.name(), "fileChanged");
        assert_eq!(DataEvent::DataLoadFailed(vec![]).name(), "dataLoadFailed");
    }
}
