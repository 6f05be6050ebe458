//! Typed observer lists
//!
//! Every message kind and clock notification gets its own `EventEmitter<T>`.
//! Registering a listener returns a [`Subscription`] that removes exactly that
//! listener when consumed.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

/// A list of listeners for one kind of event
pub struct EventEmitter<T> {
    inner: Arc<Mutex<Listeners<T>>>,
}

impl<T: 'static> EventEmitter<T> {
    /// Create an emitter with no listeners
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut listeners = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, Arc::new(listener)));
            id
        };

        let weak: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut listeners = inner.lock().unwrap_or_else(PoisonError::into_inner);
                listeners.entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Invoke every listener with `value`
    ///
    /// The listener list is snapshotted first, so listeners may subscribe,
    /// unsubscribe or clear the emitter while being notified.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = {
            let listeners = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in snapshot {
            listener(value);
        }
    }

    /// Drop every listener
    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clear();
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Handle returned by [`EventEmitter::subscribe`]
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "dropping a Subscription leaves the listener registered"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new<F>(remove: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Remove the listener this handle was created for
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

/// Declares a struct holding one public `EventEmitter` per event kind, plus
/// `clear()` and `listener_count()` over all of them.
#[macro_export]
macro_rules! event_set {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        $vis struct $name {
            $( $(#[$fmeta])* pub $field: $crate::utils::events::EventEmitter<$ty>, )*
        }

        impl $name {
            /// Drop every listener of every event kind
            pub fn clear(&self) {
                $( self.$field.clear(); )*
            }

            /// Total number of registered listeners
            pub fn listener_count(&self) -> usize {
                0 $( + self.$field.len() )*
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_all_listeners() {
        let emitter = EventEmitter::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t1 = Arc::clone(&total);
        let _a = emitter.subscribe(move |v| {
            t1.fetch_add(*v as usize, Ordering::Relaxed);
        });
        let t2 = Arc::clone(&total);
        let _b = emitter.subscribe(move |v| {
            t2.fetch_add(*v as usize * 10, Ordering::Relaxed);
        });

        emitter.emit(&2);
        assert_eq!(total.load(Ordering::Relaxed), 22);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let emitter = EventEmitter::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = Arc::clone(&hits);
        let first = emitter.subscribe(move |_| {
            h1.fetch_add(1, Ordering::Relaxed);
        });
        let h2 = Arc::clone(&hits);
        let _second = emitter.subscribe(move |_| {
            h2.fetch_add(100, Ordering::Relaxed);
        });

        first.unsubscribe();
        assert_eq!(emitter.len(), 1);

        emitter.emit(&());
        assert_eq!(hits.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_listener_may_clear_emitter_while_notified() {
        let emitter = EventEmitter::<()>::new();
        let inner = emitter.clone();
        let _s = emitter.subscribe(move |_| inner.clear());

        emitter.emit(&());
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_unsubscribe_after_emitter_dropped() {
        let emitter = EventEmitter::<()>::new();
        let sub = emitter.subscribe(|_| {});
        drop(emitter);
        sub.unsubscribe();
    }
}
