/*!
Synchronous write-event notification.

Repositories post an event for every write that goes through them, and
bulk writers post a single all-data event at the end of a run. Listeners
(memo caches, UI refreshers) run synchronously on the writing thread, so
by the time a write call returns every subscribed cache has seen it. This
replaces any ambient global cache with explicit, observable wiring.
*/

use std::sync::{Mutex, PoisonError};

use crate::model::EntityKind;

/// A change that went through a repository write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEvent {
    /// Rows of one kind were inserted or overwritten.
    Saved { kind: EntityKind, rows: usize },
    /// Every row of one kind was removed.
    DeletedAll { kind: EntityKind },
    /// A bulk operation rewrote data across many kinds at once.
    AllDataChanged,
}

type Listener = Box<dyn Fn(&WriteEvent) + Send + Sync>;

/// Synchronous fan-out of [`WriteEvent`]s to subscribed listeners.
///
/// Listeners are invoked in subscription order while the event lock is
/// held; a listener must not subscribe or post from inside its callback.
#[derive(Default)]
pub struct DataObserver {
    listeners: Mutex<Vec<Listener>>,
}

impl DataObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every future event.
    pub fn subscribe(&self, listener: impl Fn(&WriteEvent) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Deliver an event to every listener, synchronously.
    pub fn post(&self, event: &WriteEvent) {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(event);
        }
    }
}

impl std::fmt::Debug for DataObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("DataObserver")
            .field("listeners", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_events_reach_listeners_in_order() {
        let observer = DataObserver::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            observer.subscribe(move |event| {
                seen.lock().unwrap().push((tag, event.clone()));
            });
        }

        observer.post(&WriteEvent::Saved {
            kind: EntityKind::Account,
            rows: 2,
        });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "first");
        assert_eq!(seen[1].0, "second");
        assert!(matches!(
            seen[0].1,
            WriteEvent::Saved { kind: EntityKind::Account, rows: 2 }
        ));
    }

    #[test]
    fn test_late_subscribers_miss_earlier_events() {
        let observer = DataObserver::new();
        observer.post(&WriteEvent::AllDataChanged);

        let seen = Arc::new(Mutex::new(0usize));
        {
            let seen = Arc::clone(&seen);
            observer.subscribe(move |_| *seen.lock().unwrap() += 1);
        }
        observer.post(&WriteEvent::DeletedAll {
            kind: EntityKind::Tag,
        });

        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
