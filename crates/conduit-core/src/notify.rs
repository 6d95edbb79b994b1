//! Notification bus for buffer and component events.
//!
//! The engine only publishes. [`Notifier`] is the boundary; the in-memory
//! [`NotificationBus`] is the implementation used by tests and the CLI.
//!
//! Callbacks run inside the publisher's critical section (a buffer
//! produce or consume holds the buffer lock while it publishes), so a
//! callback must not lock the buffer it is observing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Event published by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferEvent {
    /// Bytes were written into a buffer.
    Produce {
        /// Host id of the buffer.
        buffer: u32,
        /// Offset of the first written byte.
        begin: usize,
        /// Bytes written.
        bytes: usize,
    },
    /// Bytes were read out of a buffer.
    Consume {
        /// Host id of the buffer.
        buffer: u32,
        /// Offset of the first read byte.
        begin: usize,
        /// Bytes read.
        bytes: usize,
    },
    /// The buffer is about to be released.
    Free {
        /// Host id of the buffer.
        buffer: u32,
    },
    /// A component's stream configuration changed.
    ConfigChanged {
        /// Host id of the component.
        component: u32,
    },
}

impl BufferEvent {
    /// Host id of the object the event is about.
    pub fn subject(&self) -> u32 {
        match *self {
            BufferEvent::Produce { buffer, .. }
            | BufferEvent::Consume { buffer, .. }
            | BufferEvent::Free { buffer } => buffer,
            BufferEvent::ConfigChanged { component } => component,
        }
    }
}

/// Which cores an event must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyScope {
    /// Observers on the publishing core only.
    CoreLocal,
    /// Observers on every core.
    AllCores,
}

/// Publishing side of the notification bus.
pub trait Notifier: Send + Sync {
    /// Delivers `event` to the subscribers within `scope`.
    fn publish(&self, event: &BufferEvent, scope: NotifyScope);

    /// Drops every subscription attached to `subject`.
    fn unregister_all(&self, subject: u32);
}

/// Handle returned by [`NotificationBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn Fn(&BufferEvent, NotifyScope) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    subject: Option<u32>,
    callback: Callback,
}

/// In-memory publish/subscribe bus.
#[derive(Default)]
pub struct NotificationBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl NotificationBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bus behind an `Arc`, ready to hand to the topology.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Registers `callback` for events about `subject`, or for every event when `None`.
    pub fn subscribe<F>(&self, subject: Option<u32>, callback: F) -> SubscriptionId
    where
        F: Fn(&BufferEvent, NotifyScope) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().push(Subscription {
            id,
            subject,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes one subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

impl Notifier for NotificationBus {
    fn publish(&self, event: &BufferEvent, scope: NotifyScope) {
        let subject = event.subject();
        for sub in self.subscriptions.lock().iter() {
            if sub.subject.is_none_or(|s| s == subject) {
                (sub.callback)(event, scope);
            }
        }
    }

    fn unregister_all(&self, subject: u32) {
        let mut subs = self.subscriptions.lock();
        let before = subs.len();
        subs.retain(|s| s.subject != Some(subject));
        let dropped = before - subs.len();
        if dropped > 0 {
            tracing::debug!(subject, dropped, "forced unsubscribe");
        }
    }
}

impl core::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscriptions", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subject_filtering() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        bus.subscribe(Some(7), move |_, _| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        let a = all.clone();
        bus.subscribe(None, move |_, _| {
            a.fetch_add(1, Ordering::Relaxed);
        });

        bus.publish(&BufferEvent::Free { buffer: 7 }, NotifyScope::CoreLocal);
        bus.publish(&BufferEvent::Free { buffer: 8 }, NotifyScope::CoreLocal);

        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(all.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_unregister_all_drops_subject_only() {
        let bus = NotificationBus::new();
        bus.subscribe(Some(1), |_, _| {});
        bus.subscribe(Some(1), |_, _| {});
        bus.subscribe(Some(2), |_, _| {});
        bus.subscribe(None, |_, _| {});

        bus.unregister_all(1);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = NotificationBus::new();
        let id = bus.subscribe(None, |_, _| {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
    }
}
