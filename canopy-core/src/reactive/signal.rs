//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (an effect), the
//!    signal registers that context as a subscriber with the runtime.
//!
//! 2. When a signal's value is set, the runtime queues every subscriber.
//!
//! 3. Queued subscribers re-run immediately, or when the enclosing batch
//!    closes.
//!
//! `set` always notifies; callers that want change detection compare
//! before writing, as the store does.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::SignalId;

struct SignalInner<T> {
    id: SignalId,
    value: RwLock<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::forget_signal(self.id);
    }
}

/// A reactive signal holding a value of type T.
///
/// Clones share the same value and identity. Dropping the last clone
/// removes the signal's edges from the runtime.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let value = count.get();
///
/// // Notifies subscribers
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: SignalId::next(),
                value: RwLock::new(value),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    fn track(&self) {
        if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
            ReactiveContext::track_dependency(self.inner.id);
            Runtime::add_dependency(self.inner.id, subscriber_id);
        }
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.read().clone()
    }

    /// Borrow the current value, tracking like [`Signal::get`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.read())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        Runtime::notify_signal_change(self.inner.id);
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.inner.value.read());
        self.set(new_value);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.id)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{untrack, SubscriberId};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_with_borrows() {
        let signal = Signal::new(String::from("hello"));
        assert_eq!(signal.with(|s| s.len()), 5);
    }

    #[test]
    fn signal_read_registers_current_subscriber() {
        let signal = Signal::new(1);
        let id = SubscriberId::new();

        {
            let _ctx = ReactiveContext::enter(id);
            signal.get();
            signal.get();
            assert_eq!(ReactiveContext::get_dependencies(), vec![signal.id(), signal.id()]);
        }

        assert_eq!(signal.subscriber_count(), 1);
        Runtime::clear_dependencies(id, [signal.id()]);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let signal = Signal::new(1);
        let _ctx = ReactiveContext::enter(SubscriberId::new());

        assert_eq!(signal.get_untracked(), 1);
        assert_eq!(untrack(|| signal.get()), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        assert_ne!(s1.id(), s2.id());
    }
}
