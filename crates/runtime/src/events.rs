//! Synchronous observer notification and the scope lifecycle events.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use tracing::trace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::qualifier::{Qualifier, Qualifiers};
use crate::scope::Scope;

/// Fired when a scope's context comes up: at container startup for the
/// application scope, at activation for a fresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScopeInitialized {
    /// The scope that was initialized.
    pub scope: Scope,
}

/// Fired right before a scope's instances are destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScopeBeforeDestroyed {
    /// The scope about to be destroyed.
    pub scope: Scope,
}

/// Fired after a scope's instances have been destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScopeDestroyed {
    /// The scope that was destroyed.
    pub scope: Scope,
}

type ObserverFn = Box<dyn Fn(&dyn Any) + Send + Sync>;

/// An observer of one event type, registered with the container builder.
///
/// Observers run synchronously on the firing thread, in ascending priority
/// order. An observer with qualifiers only sees events fired with at least
/// those qualifiers; an observer without qualifiers sees every event of its
/// type.
pub struct Observer {
    event_type: TypeId,
    event_type_name: &'static str,
    qualifiers: Qualifiers,
    priority: i32,
    callback: ObserverFn,
}

impl Observer {
    /// Observe events of type `E` with the given callback.
    pub fn new<E, F>(callback: F) -> Self
    where
        E: 'static,
        F: Fn(&E) + Send + Sync + 'static,
    {
        Self {
            event_type: TypeId::of::<E>(),
            event_type_name: type_name::<E>(),
            qualifiers: Qualifiers::new(),
            priority: 0,
            callback: Box::new(move |event: &dyn Any| {
                if let Some(event) = event.downcast_ref::<E>() {
                    callback(event);
                }
            }),
        }
    }

    /// Notification order among observers of the same event; lower runs
    /// first. Defaults to 0.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Require a qualifier on fired events.
    #[must_use]
    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.add(qualifier);
        self
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("event_type", &self.event_type_name)
            .field("qualifiers", &self.qualifiers)
            .field("priority", &self.priority)
            .finish()
    }
}

/// The container's observer registry. Immutable after build; cheap to clone.
#[derive(Clone)]
pub(crate) struct EventNotifier {
    inner: Arc<NotifierInner>,
}

struct NotifierInner {
    /// Sorted by ascending priority at build.
    observers: Vec<Observer>,
    lifecycle_events: bool,
}

impl EventNotifier {
    pub(crate) fn new(mut observers: Vec<Observer>, lifecycle_events: bool) -> Self {
        observers.sort_by_key(|o| o.priority);
        Self {
            inner: Arc::new(NotifierInner {
                observers,
                lifecycle_events,
            }),
        }
    }

    /// Fire an event with no qualifiers.
    pub(crate) fn fire<E: 'static>(&self, event: &E) {
        self.fire_with(event, &Qualifiers::new());
    }

    /// Fire an event; observers whose qualifiers are all present in
    /// `qualifiers` are notified in ascending priority order.
    pub(crate) fn fire_with<E: 'static>(&self, event: &E, qualifiers: &Qualifiers) {
        let event_type = TypeId::of::<E>();
        for observer in &self.inner.observers {
            if observer.event_type == event_type && observer.qualifiers.all_in(qualifiers) {
                trace!(event = observer.event_type_name, priority = observer.priority, "notifying observer");
                (observer.callback)(event);
            }
        }
    }

    /// Fire a scope lifecycle event, unless lifecycle events are disabled
    /// in the container config.
    pub(crate) fn fire_lifecycle<E: 'static>(&self, event: &E) {
        if self.inner.lifecycle_events {
            self.fire(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct Ping(&'static str);

    fn notifier(observers: Vec<Observer>) -> EventNotifier {
        EventNotifier::new(observers, true)
    }

    #[test]
    fn test_observers_run_in_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2, l3) = (Arc::clone(&log), Arc::clone(&log), Arc::clone(&log));
        let notifier = notifier(vec![
            Observer::new::<Ping, _>(move |_| l1.lock().push("late")).priority(10),
            Observer::new::<Ping, _>(move |_| l2.lock().push("early")).priority(-10),
            Observer::new::<Ping, _>(move |_| l3.lock().push("default")),
        ]);
        notifier.fire(&Ping("x"));
        assert_eq!(*log.lock(), vec!["early", "default", "late"]);
    }

    #[test]
    fn test_observers_filter_by_event_type() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l1 = Arc::clone(&log);
        let notifier = notifier(vec![Observer::new::<Ping, _>(move |p| l1.lock().push(p.0))]);
        notifier.fire(&Ping("seen"));
        notifier.fire(&42u32);
        assert_eq!(*log.lock(), vec!["seen"]);
    }

    #[test]
    fn test_qualified_observer_requires_qualifiers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l1 = Arc::clone(&log);
        let notifier = notifier(vec![
            Observer::new::<Ping, _>(move |p| l1.lock().push(p.0))
                .qualifier(Qualifier::custom("Audit")),
        ]);
        notifier.fire(&Ping("plain"));
        notifier.fire_with(
            &Ping("audited"),
            &Qualifiers::from(Qualifier::custom("Audit")),
        );
        assert_eq!(*log.lock(), vec!["audited"]);
    }

    #[test]
    fn test_lifecycle_toggle_suppresses_lifecycle_events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l1 = Arc::clone(&log);
        let notifier = EventNotifier::new(
            vec![Observer::new::<ScopeInitialized, _>(move |e| {
                l1.lock().push(e.scope.clone());
            })],
            false,
        );
        notifier.fire_lifecycle(&ScopeInitialized {
            scope: Scope::Request,
        });
        assert!(log.lock().is_empty());
    }
}
