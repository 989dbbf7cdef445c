//! Integration Tests for the Reactive System
//!
//! These tests verify that signals, effects, batches and cleanups work
//! together correctly.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use canopy_core::reactive::{on_cleanup, untrack, Effect, ReactiveContext, Runtime, Signal, SubscriberId};

/// Test that an effect tracks signal dependencies.
#[test]
fn effect_tracks_signal_dependency() {
    let signal = Signal::new(0);
    let observed_value = Arc::new(AtomicI32::new(-1));
    let observed_clone = observed_value.clone();

    // Create an effect that reads from the signal
    let signal_clone = signal.clone();
    let _effect = Effect::new(move || {
        let value = signal_clone.get();
        observed_clone.store(value, Ordering::SeqCst);
    });

    // Effect runs on creation, captures initial value
    assert_eq!(observed_value.load(Ordering::SeqCst), 0);

    // Setting the signal re-runs the effect
    signal.set(42);
    assert_eq!(observed_value.load(Ordering::SeqCst), 42);
}

/// Test that a batch coalesces writes into one effect run.
#[test]
fn batch_runs_effect_once() {
    let a = Signal::new(1);
    let b = Signal::new(2);
    let sum = Arc::new(AtomicI32::new(0));

    let effect = Effect::new({
        let (a, b, sum) = (a.clone(), b.clone(), sum.clone());
        move || sum.store(a.get() + b.get(), Ordering::SeqCst)
    });
    assert_eq!(sum.load(Ordering::SeqCst), 3);

    Runtime::batch(|| {
        a.set(10);
        b.set(20);
        // Nothing runs until the batch closes
        assert_eq!(effect.run_count(), 1);
        assert!(Runtime::pending_count() >= 1);
    });

    assert_eq!(effect.run_count(), 2);
    assert_eq!(sum.load(Ordering::SeqCst), 30);
}

/// Test that nested batches only flush at the outermost level.
#[test]
fn nested_batches_flush_once() {
    let signal = Signal::new(0);
    let effect = Effect::new({
        let signal = signal.clone();
        move || {
            signal.get();
        }
    });

    Runtime::batch(|| {
        Runtime::batch(|| signal.set(1));
        assert_eq!(effect.run_count(), 1);
        signal.set(2);
    });

    assert_eq!(effect.run_count(), 2);
    assert!(!Runtime::is_batching());
}

/// Test effect disposal stops execution.
#[test]
fn disposed_effect_does_not_run() {
    let signal = Signal::new(0);
    let run_count = Arc::new(AtomicI32::new(0));
    let run_clone = run_count.clone();

    let signal_clone = signal.clone();
    let effect = Effect::new(move || {
        signal_clone.get();
        run_clone.fetch_add(1, Ordering::SeqCst);
    });

    // Ran once on creation
    assert_eq!(run_count.load(Ordering::SeqCst), 1);

    // Dispose the effect
    effect.dispose();

    // Further writes should not run it
    signal.set(1);
    signal.set(2);
    effect.execute();

    assert_eq!(run_count.load(Ordering::SeqCst), 1);
    assert_eq!(signal.subscriber_count(), 0);
}

/// Test that dropping the last handle unregisters the effect.
#[test]
fn dropped_effect_is_unsubscribed() {
    let signal = Signal::new(0);
    let effect = Effect::new({
        let signal = signal.clone();
        move || {
            signal.get();
        }
    });
    assert_eq!(signal.subscriber_count(), 1);

    drop(effect);
    assert_eq!(signal.subscriber_count(), 0);

    // Writing with no subscribers is fine
    signal.set(1);
}

/// Test that ReactiveContext correctly tracks nested computations.
#[test]
fn nested_reactive_contexts() {
    let outer_id = SubscriberId::new();
    let inner_id = SubscriberId::new();
    let signals: Vec<Signal<i32>> = (0..4).map(Signal::new).collect();
    let ids: Vec<_> = signals.iter().map(Signal::id).collect();

    // Enter outer context
    let _outer_ctx = ReactiveContext::enter(outer_id);
    ReactiveContext::track_dependency(ids[0]);
    ReactiveContext::track_dependency(ids[1]);

    // Enter inner context
    {
        let _inner_ctx = ReactiveContext::enter(inner_id);
        ReactiveContext::track_dependency(ids[2]);
        ReactiveContext::track_dependency(ids[3]);

        // Inner context should see its own dependencies
        let inner_deps = ReactiveContext::get_dependencies();
        assert_eq!(inner_deps.len(), 2);
        assert!(inner_deps.contains(&ids[2]));
        assert!(inner_deps.contains(&ids[3]));
    }

    // Back to outer context, should see outer dependencies only
    let outer_deps = ReactiveContext::get_dependencies();
    assert_eq!(outer_deps.len(), 2);
    assert!(outer_deps.contains(&ids[0]));
    assert!(outer_deps.contains(&ids[1]));
}

/// Test that untracked reads inside an effect do not subscribe.
#[test]
fn untracked_read_inside_effect() {
    let tracked = Signal::new(0);
    let ignored = Signal::new(0);

    let effect = Effect::new({
        let (tracked, ignored) = (tracked.clone(), ignored.clone());
        move || {
            tracked.get();
            untrack(|| ignored.get());
        }
    });

    ignored.set(1);
    assert_eq!(effect.run_count(), 1);

    tracked.set(1);
    assert_eq!(effect.run_count(), 2);
    assert_eq!(effect.dependency_count(), 1);
}

/// Test the cleanup lifecycle across re-runs.
#[test]
fn cleanups_run_once_per_rerun() {
    let signal = Signal::new(0);
    let cleanups = Arc::new(AtomicI32::new(0));

    let _effect = Effect::new({
        let signal = signal.clone();
        let cleanups = cleanups.clone();
        move || {
            signal.get();
            let cleanups = cleanups.clone();
            on_cleanup(move || {
                cleanups.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    for i in 1..=3 {
        signal.set(i);
        assert_eq!(cleanups.load(Ordering::SeqCst), i);
    }
}
