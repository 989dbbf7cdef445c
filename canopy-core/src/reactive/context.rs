//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running an effect pushes a
//! tracking frame for its subscriber; [`untrack`] pushes a frame with no
//! subscriber, which hides any outer frame from signal reads. Frames are
//! popped by the RAII guard, so the stack stays balanced even if the
//! computation panics.
//!
//! A frame also collects the cleanup callbacks registered with
//! [`on_cleanup`] while its computation runs. The owning effect takes them
//! and runs them before its next execution.

use std::cell::RefCell;

use tracing::warn;

use super::subscriber::{SignalId, SubscriberId};

/// A callback run before an effect re-executes or when it is disposed.
pub(crate) type Cleanup = Box<dyn FnOnce() + Send>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// One frame of the context stack.
struct ContextEntry {
    /// `None` marks an untracked frame.
    subscriber_id: Option<SubscriberId>,
    /// Signals read while this frame was on top.
    dependencies: Vec<SignalId>,
    cleanups: Vec<Cleanup>,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any signals that are read will
    /// register the subscriber as a dependent.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    /// Enter a frame in which signal reads are not tracked.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(subscriber_id: Option<SubscriberId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                dependencies: Vec::new(),
                cleanups: Vec::new(),
            });
        });

        Self { subscriber_id }
    }

    /// Check if reads on this thread are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber_id))
    }

    /// Record a dependency on the given signal.
    ///
    /// This is called by signals when they are read. Untracked frames
    /// ignore it.
    pub fn track_dependency(signal_id: SignalId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.subscriber_id.is_some() {
                    entry.dependencies.push(signal_id);
                }
            }
        });
    }

    /// Get the dependencies collected in the current context.
    pub fn get_dependencies() -> Vec<SignalId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.clone())
                .unwrap_or_default()
        })
    }

    /// Take the cleanups registered in the current frame.
    pub(crate) fn take_cleanups() -> Vec<Cleanup> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.cleanups))
                .unwrap_or_default()
        })
    }

    /// Attach a cleanup to the nearest tracking frame.
    ///
    /// Returns the cleanup back if no effect is running.
    fn register_cleanup(cleanup: Cleanup) -> Result<(), Cleanup> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.iter_mut().rev().find(|entry| entry.subscriber_id.is_some()) {
                Some(entry) => {
                    entry.cleanups.push(cleanup);
                    Ok(())
                }
                None => Err(cleanup),
            }
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
        });
    }
}

/// Run `f` without tracking any signal it reads.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

/// Register a callback to run before the current effect re-runs or when it
/// is disposed.
///
/// Outside of an effect there is nothing to attach to, so the callback is
/// dropped without running.
pub fn on_cleanup<F>(cleanup: F)
where
    F: FnOnce() + Send + 'static,
{
    if ReactiveContext::register_cleanup(Box::new(cleanup)).is_err() {
        warn!("on_cleanup called outside of a running effect; cleanup dropped");
    }
}
