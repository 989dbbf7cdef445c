//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals and
//! effects. It owns the dependency edges and schedules effects when
//! signals change.
//!
//! # How It Works
//!
//! 1. When an effect is created, it registers with the runtime.
//!
//! 2. When an effect reads a signal, the runtime records the edge
//!    signal → subscriber.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Finds all subscribers of that signal
//!    b. Marks them dirty
//!    c. Queues them (once per subscriber) in the pending queue
//!    d. Drains the queue unless a batch is open
//!
//! # Batching
//!
//! [`Runtime::batch`] defers draining the queue until the outermost batch
//! on the current thread closes, so any number of signal writes inside it
//! produce a single re-run per affected effect. Effect bodies themselves
//! run inside an implicit batch, which means a write performed by an
//! effect never re-enters a running effect: the write is queued and picked
//! up by the drain loop afterwards.
//!
//! # Thread Safety
//!
//! The registry and the edge table are global concurrent maps so signals
//! can be shared across threads. Batch depth and the pending queue are
//! thread-local: effects scheduled by a write run on the writing thread.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::IndexSet;
use tracing::trace;

use super::context::ReactiveContext;
use super::subscriber::{SignalId, SubscriberId};

/// A trait for computations that re-run when their dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Mark this reactive value as needing to run.
    fn mark_dirty(&self);

    /// Run the computation.
    fn run(&self);
}

/// Handle to a registered reactive value.
///
/// Dropping this handle unregisters the reactive value from the runtime.
#[derive(Debug)]
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

/// The global reactive runtime.
pub struct Runtime;

// Maps subscriber IDs to weak references to avoid preventing cleanup.
static REGISTRY: OnceLock<DashMap<SubscriberId, Weak<dyn Reactive>>> = OnceLock::new();
static SIGNAL_SUBSCRIBERS: OnceLock<DashMap<SignalId, IndexSet<SubscriberId>>> = OnceLock::new();

thread_local! {
    static BATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
    static PENDING: RefCell<PendingQueue> = RefCell::new(PendingQueue::default());
}

/// FIFO of subscribers waiting to run, holding each subscriber at most once.
#[derive(Default)]
struct PendingQueue {
    order: VecDeque<(SubscriberId, Arc<dyn Reactive>)>,
    /// Ids that are queued and still live. An entry in `order` whose id is
    /// missing here was cancelled and is skipped when popped.
    queued: HashSet<SubscriberId>,
}

impl PendingQueue {
    fn push(&mut self, id: SubscriberId, reactive: Arc<dyn Reactive>) {
        if self.queued.insert(id) {
            self.order.push_back((id, reactive));
        }
    }

    fn pop(&mut self) -> Option<Arc<dyn Reactive>> {
        while let Some((id, reactive)) = self.order.pop_front() {
            if self.queued.remove(&id) {
                return Some(reactive);
            }
        }
        None
    }

    fn cancel(&mut self, id: SubscriberId) {
        self.queued.remove(&id);
    }

    fn len(&self) -> usize {
        self.queued.len()
    }
}

fn get_registry() -> &'static DashMap<SubscriberId, Weak<dyn Reactive>> {
    REGISTRY.get_or_init(DashMap::new)
}

fn get_signal_subscribers() -> &'static DashMap<SignalId, IndexSet<SubscriberId>> {
    SIGNAL_SUBSCRIBERS.get_or_init(DashMap::new)
}

/// Guard for an open batch. The queue is drained when the outermost guard
/// on the thread is dropped.
pub(crate) struct BatchGuard {
    _private: (),
}

impl BatchGuard {
    fn enter() -> Self {
        BATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self { _private: () }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let depth = BATCH_DEPTH.with(|depth| {
            let next = depth.get() - 1;
            depth.set(next);
            next
        });
        if depth == 0 && !std::thread::panicking() {
            Runtime::flush();
        }
    }
}

/// Resets the flushing flag even if an effect panics mid-drain.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        FLUSHING.with(|flag| flag.set(false));
    }
}

impl Runtime {
    /// Register a reactive value with the runtime.
    ///
    /// Returns a handle that unregisters the value when dropped.
    pub fn register(reactive: Arc<dyn Reactive>) -> ReactiveHandle {
        let id = reactive.subscriber_id();
        get_registry().insert(id, Arc::downgrade(&reactive));
        ReactiveHandle { subscriber_id: id }
    }

    /// Unregister a reactive value and drop all of its edges.
    fn unregister(id: SubscriberId) {
        get_registry().remove(&id);

        for mut subs in get_signal_subscribers().iter_mut() {
            subs.shift_remove(&id);
        }

        PENDING.with(|pending| {
            pending.borrow_mut().cancel(id);
        });
    }

    /// Record that a subscriber depends on a signal.
    ///
    /// Called automatically when a signal is read within a reactive context.
    pub fn add_dependency(signal_id: SignalId, subscriber_id: SubscriberId) {
        get_signal_subscribers()
            .entry(signal_id)
            .or_default()
            .insert(subscriber_id);
    }

    /// Remove the given edges for a subscriber.
    ///
    /// Called before re-running a computation to clear stale dependencies.
    pub fn clear_dependencies<I>(subscriber_id: SubscriberId, signals: I)
    where
        I: IntoIterator<Item = SignalId>,
    {
        let table = get_signal_subscribers();
        for signal_id in signals {
            if let Some(mut subs) = table.get_mut(&signal_id) {
                subs.shift_remove(&subscriber_id);
            }
        }
    }

    /// Drop every edge leading out of a signal that no longer exists.
    pub(crate) fn forget_signal(signal_id: SignalId) {
        get_signal_subscribers().remove(&signal_id);
    }

    /// Number of subscribers currently depending on a signal.
    pub fn subscriber_count(signal_id: SignalId) -> usize {
        get_signal_subscribers()
            .get(&signal_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Notify all subscribers that a signal changed.
    ///
    /// This is the core update propagation mechanism.
    pub fn notify_signal_change(signal_id: SignalId) {
        let subscriber_ids: Vec<SubscriberId> = get_signal_subscribers()
            .get(&signal_id)
            .map(|subs| subs.iter().copied().collect())
            .unwrap_or_default();

        if subscriber_ids.is_empty() {
            return;
        }

        let registry = get_registry();
        for sub_id in subscriber_ids {
            let reactive = registry.get(&sub_id).and_then(|weak| weak.upgrade());
            if let Some(reactive) = reactive {
                reactive.mark_dirty();
                PENDING.with(|pending| {
                    pending.borrow_mut().push(sub_id, reactive);
                });
            }
        }

        if !Self::is_batching() {
            Self::flush();
        }
    }

    /// Run `f` as one transaction: effects scheduled by writes inside it run
    /// once, after the outermost batch on this thread closes.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        let _guard = BatchGuard::enter();
        f()
    }

    /// Open a batch that closes when the guard is dropped.
    pub(crate) fn begin_batch() -> BatchGuard {
        BatchGuard::enter()
    }

    /// Check if a batch is open on this thread.
    pub fn is_batching() -> bool {
        BATCH_DEPTH.with(|depth| depth.get() > 0)
    }

    /// Number of subscribers waiting to run on this thread.
    pub fn pending_count() -> usize {
        PENDING.with(|pending| pending.borrow().len())
    }

    /// Run queued subscribers until the queue is empty.
    ///
    /// Re-entrant calls (from an effect that writes) return immediately; the
    /// outer drain loop picks up whatever they queued.
    pub fn flush() {
        if FLUSHING.with(|flag| flag.replace(true)) {
            return;
        }
        let _reset = FlushGuard;

        let mut runs = 0usize;
        loop {
            let next = PENDING.with(|pending| pending.borrow_mut().pop());
            let Some(reactive) = next else {
                break;
            };
            reactive.run();
            runs += 1;
        }

        if runs > 0 {
            trace!(runs, "drained pending effects");
        }
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

    struct MockReactive {
        id: SubscriberId,
        dirty: AtomicBool,
        runs: AtomicI32,
    }

    impl MockReactive {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: SubscriberId::new(),
                dirty: AtomicBool::new(false),
                runs: AtomicI32::new(0),
            })
        }
    }

    impl Reactive for MockReactive {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn mark_dirty(&self) {
            self.dirty.store(true, Ordering::SeqCst);
        }

        fn run(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn runtime_registers_and_unregisters() {
        let reactive = MockReactive::new();
        let id = reactive.id;

        let handle = Runtime::register(reactive);
        assert!(get_registry().contains_key(&id));

        drop(handle);
        assert!(!get_registry().contains_key(&id));
    }

    #[test]
    fn runtime_notifies_subscribers() {
        let a = MockReactive::new();
        let b = MockReactive::new();
        let _ha = Runtime::register(a.clone());
        let _hb = Runtime::register(b.clone());

        let signal = SignalId::next();
        Runtime::add_dependency(signal, a.id);
        Runtime::add_dependency(signal, b.id);

        Runtime::notify_signal_change(signal);

        assert!(a.dirty.load(Ordering::SeqCst));
        assert_eq!(a.runs.load(Ordering::SeqCst), 1);
        assert_eq!(b.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_coalesces_notifications() {
        let reactive = MockReactive::new();
        let _handle = Runtime::register(reactive.clone());

        let (s1, s2) = (SignalId::next(), SignalId::next());
        Runtime::add_dependency(s1, reactive.id);
        Runtime::add_dependency(s2, reactive.id);

        Runtime::batch(|| {
            Runtime::notify_signal_change(s1);
            Runtime::notify_signal_change(s2);
            Runtime::notify_signal_change(s1);
            assert_eq!(reactive.runs.load(Ordering::SeqCst), 0);
            assert_eq!(Runtime::pending_count(), 1);
        });

        assert_eq!(reactive.runs.load(Ordering::SeqCst), 1);
        assert_eq!(Runtime::pending_count(), 0);
    }

    #[test]
    fn nested_batches_flush_once_at_the_outermost() {
        let reactive = MockReactive::new();
        let _handle = Runtime::register(reactive.clone());
        let signal = SignalId::next();
        Runtime::add_dependency(signal, reactive.id);

        Runtime::batch(|| {
            Runtime::batch(|| Runtime::notify_signal_change(signal));
            assert!(Runtime::is_batching());
            assert_eq!(reactive.runs.load(Ordering::SeqCst), 0);
        });

        assert!(!Runtime::is_batching());
        assert_eq!(reactive.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn runtime_clears_dependencies() {
        let reactive = MockReactive::new();
        let _handle = Runtime::register(reactive.clone());
        let signal = SignalId::next();

        Runtime::add_dependency(signal, reactive.id);
        assert_eq!(Runtime::subscriber_count(signal), 1);

        Runtime::clear_dependencies(reactive.id, [signal]);
        assert_eq!(Runtime::subscriber_count(signal), 0);

        Runtime::notify_signal_change(signal);
        assert_eq!(reactive.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropped_subscriber_is_not_run() {
        let reactive = MockReactive::new();
        let handle = Runtime::register(reactive.clone());
        let signal = SignalId::next();
        Runtime::add_dependency(signal, reactive.id);

        drop(handle);
        Runtime::notify_signal_change(signal);
        assert_eq!(reactive.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pending_queue_is_fifo_and_holds_each_subscriber_once() {
        let (a, b) = (MockReactive::new(), MockReactive::new());
        let mut queue = PendingQueue::default();

        queue.push(a.id, a.clone());
        queue.push(b.id, b.clone());
        queue.push(a.id, a.clone());
        assert_eq!(queue.len(), 2);

        let first = queue.pop().map(|r| r.subscriber_id());
        assert_eq!(first, Some(a.id));

        // Popped subscribers can be queued again, behind the rest.
        queue.push(a.id, a.clone());
        assert_eq!(queue.pop().map(|r| r.subscriber_id()), Some(b.id));
        assert_eq!(queue.pop().map(|r| r.subscriber_id()), Some(a.id));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn subscriber_dropped_while_queued_is_skipped() {
        let (a, b) = (MockReactive::new(), MockReactive::new());
        let _ha = Runtime::register(a.clone());
        let hb = Runtime::register(b.clone());
        let signal = SignalId::next();
        Runtime::add_dependency(signal, a.id);
        Runtime::add_dependency(signal, b.id);

        Runtime::batch(|| {
            Runtime::notify_signal_change(signal);
            assert_eq!(Runtime::pending_count(), 2);
            drop(hb);
            assert_eq!(Runtime::pending_count(), 1);
        });

        assert_eq!(a.runs.load(Ordering::SeqCst), 1);
        assert_eq!(b.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn large_drain_runs_every_subscriber_once() {
        let signal = SignalId::next();
        let subscribers: Vec<_> = (0..5_000).map(|_| MockReactive::new()).collect();
        let _handles: Vec<_> = subscribers
            .iter()
            .map(|reactive| {
                Runtime::add_dependency(signal, reactive.id);
                Runtime::register(reactive.clone())
            })
            .collect();

        Runtime::notify_signal_change(signal);

        assert!(subscribers.iter().all(|r| r.runs.load(Ordering::SeqCst) == 1));
        assert_eq!(Runtime::pending_count(), 0);
    }
}
