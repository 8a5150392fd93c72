//! Signal Implementation
//!
//! A Signal holds a value that changes over time and notifies listeners on
//! every write. The scheduler keeps the current [`Location`] in a signal so
//! that Resource Cells created once per mount can still react to later
//! navigations (see `ResourceCell::refetch_on`).
//!
//! [`Location`]: crate::route::Location

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::SubscriberId;

static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Returns `false` once it wants to be removed.
type Listener<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A shared, observable value.
///
/// Clones share the same value and listeners.
///
/// ```rust
/// use lattice_data::reactive::Signal;
///
/// let page = Signal::new(1);
/// page.set(2);
/// assert_eq!(page.get(), 2);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: u64,
    value: Arc<RwLock<T>>,
    listeners: Arc<RwLock<Vec<(SubscriberId, Listener<T>)>>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a signal holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            id: next_signal_id(),
            value: Arc::new(RwLock::new(value)),
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Identifier shared by all clones of this signal.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    /// Replace the value and notify listeners.
    pub fn set(&self, value: T) {
        *self.value.write() = value.clone();
        self.notify(&value);
    }

    /// Replace the value only if it differs from the current one.
    ///
    /// Returns whether listeners were notified.
    pub fn set_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        {
            let mut guard = self.value.write();
            if *guard == value {
                return false;
            }
            *guard = value.clone();
        }
        self.notify(&value);
        true
    }

    /// Replace the value with `f` applied to the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.value.read());
        self.set(next);
    }

    /// Register a listener invoked with the new value after every write.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> SubscriberId {
        self.subscribe_while(move |value| {
            listener(value);
            true
        })
    }

    /// Register a listener that stays subscribed for as long as it returns
    /// `true`. It is removed during the first notification returning `false`.
    pub fn subscribe_while(
        &self,
        listener: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> SubscriberId {
        let id = SubscriberId::new();
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.listeners.write().retain(|(sub, _)| *sub != id);
    }

    /// Number of registered listeners.
    pub fn subscriber_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn notify(&self, value: &T) {
        // Listeners may subscribe or unsubscribe while running.
        let listeners: Vec<(SubscriberId, Listener<T>)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        let finished: Vec<SubscriberId> = listeners
            .into_iter()
            .filter(|(_, listener)| !listener(value))
            .map(|(id, _)| id)
            .collect();

        if !finished.is_empty() {
            tracing::trace!(
                signal = self.id,
                removed = finished.len(),
                "dropped finished listeners"
            );
            self.listeners.write().retain(|(id, _)| !finished.contains(id));
        }
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &*self.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        signal.set(42);
        assert_eq!(signal.get(), 42);
        signal.update(|v| v + 1);
        assert_eq!(signal.get(), 43);
    }

    #[test]
    fn listeners_receive_new_value() {
        let signal = Signal::new(0);
        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();

        let id = signal.subscribe(move |v| seen_clone.store(*v, Ordering::SeqCst));
        signal.set(7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);

        signal.unsubscribe(id);
        signal.set(9);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn finished_listeners_are_removed() {
        let signal = Signal::new(0);
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        signal.subscribe_while(move |v| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            *v < 2
        });
        signal.subscribe(|_| {});

        signal.set(1);
        assert_eq!(signal.subscriber_count(), 2);
        signal.set(2);
        assert_eq!(signal.subscriber_count(), 1);
        signal.set(3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn set_if_changed_skips_equal_values() {
        let signal = Signal::new("a".to_string());
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        signal.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!signal.set_if_changed("a".to_string()));
        assert!(signal.set_if_changed("b".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clones_share_state() {
        let a = Signal::new(1);
        let b = a.clone();
        b.set(5);
        assert_eq!(a.get(), 5);
        assert_eq!(a.id(), b.id());
    }
}
