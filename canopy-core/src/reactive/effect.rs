//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the runtime queues the effect and runs
//!    it once the current batch closes.
//!
//! 3. Before re-running, the effect runs the cleanups registered during its
//!    previous run, clears its old dependencies and tracks new ones during
//!    execution.
//!
//! # Cleanup
//!
//! Cleanups are registered from inside the effect body with
//! [`on_cleanup`](super::on_cleanup). They run before the next execution
//! and when the effect is disposed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::context::{Cleanup, ReactiveContext};
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::subscriber::{SignalId, SubscriberId};

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_effect_id() -> u64 {
    EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct EffectInner {
    id: u64,
    subscriber_id: SubscriberId,
    run: Box<dyn Fn() + Send + Sync>,
    /// Signals read during the last run.
    dependencies: Mutex<HashSet<SignalId>>,
    /// Cleanups registered during the last run.
    cleanups: Mutex<Vec<Cleanup>>,
    dirty: AtomicBool,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectInner {
    fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.lock());
        for cleanup in cleanups {
            cleanup();
        }
    }

    fn clear_dependencies(&self) {
        let old = std::mem::take(&mut *self.dependencies.lock());
        Runtime::clear_dependencies(self.subscriber_id, old);
    }

    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        self.run_cleanups();
        self.clear_dependencies();
        self.dirty.store(false, Ordering::SeqCst);

        // Writes made by the body are queued until the body has finished and
        // its bookkeeping is stored.
        let batch = Runtime::begin_batch();

        let (dependencies, cleanups) = {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            (self.run)();
            (ReactiveContext::get_dependencies(), ReactiveContext::take_cleanups())
        };

        *self.dependencies.lock() = dependencies.into_iter().collect();
        self.cleanups.lock().extend(cleanups);
        let runs = self.run_count.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(effect = self.id, runs, "effect ran");

        drop(batch);
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn run(&self) {
        self.execute();
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Clones share state. The effect stays registered with the runtime while
/// at least one clone is alive.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
    _handle: Arc<ReactiveHandle>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// It has no dependencies until the first [`Effect::execute`].
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            id: next_effect_id(),
            subscriber_id: SubscriberId::new(),
            run: Box::new(run),
            dependencies: Mutex::new(HashSet::new()),
            cleanups: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        let handle = Runtime::register(inner.clone());

        Self {
            inner,
            _handle: Arc::new(handle),
        }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Execute the effect function now.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Dispose of the effect.
    ///
    /// Runs pending cleanups and drops all dependencies. After disposal the
    /// effect will not run again.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.run_cleanups();
        self.inner.clear_dependencies();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Check if a dependency changed since the last run.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of distinct signals read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
