//! Reactive Primitives
//!
//! This module implements the host reactive system the store is built on:
//! signals, effects, batching and dependency tracking.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (an effect), the signal automatically registers
//! that context as a dependent. When the signal's value is set, all
//! dependents are scheduled.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects may register cleanups that run before the
//! next execution.
//!
//! ## Batches
//!
//! [`Runtime::batch`] groups writes so each affected effect re-runs once,
//! after the whole group has been applied.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency.

mod context;
mod effect;
mod runtime;
mod signal;
mod subscriber;

pub use context::{on_cleanup, untrack, ReactiveContext};
pub use effect::Effect;
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use signal::Signal;
pub use subscriber::{SignalId, SubscriberId};
