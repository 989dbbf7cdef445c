//! Write epochs.
//!
//! A process-wide counter advanced once per setter call. Every node changed
//! by that call is stamped with the new epoch, so two nodes carrying the same
//! stamp were changed by the same logical write.
//!
//! [`batch_updates`](super::batch_updates) holds the clock: setter calls made
//! while it is held share the epoch that was current when the hold began.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static EPOCH: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static HOLDS: Cell<usize> = const { Cell::new(0) };
    static HELD: Cell<Option<Epoch>> = const { Cell::new(None) };
}

/// A write epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    /// Get the raw epoch value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The most recent epoch.
pub fn current() -> Epoch {
    Epoch(EPOCH.load(Ordering::SeqCst))
}

/// Start a new write. Returns the held epoch unchanged while the clock is
/// held on this thread.
pub(crate) fn advance() -> Epoch {
    if let Some(held) = HELD.with(Cell::get) {
        return held;
    }
    Epoch(EPOCH.fetch_add(1, Ordering::SeqCst) + 1)
}

/// Advance once, then keep the clock still until the guard is dropped.
pub(crate) struct ClockHold {
    epoch: Epoch,
}

impl ClockHold {
    pub(crate) fn begin() -> Self {
        let epoch = advance();
        HOLDS.with(|holds| {
            if holds.get() == 0 {
                HELD.with(|held| held.set(Some(epoch)));
            }
            holds.set(holds.get() + 1);
        });
        Self { epoch }
    }

    pub(crate) fn epoch(&self) -> Epoch {
        self.epoch
    }
}

impl Drop for ClockHold {
    fn drop(&mut self) {
        HOLDS.with(|holds| {
            holds.set(holds.get() - 1);
            if holds.get() == 0 {
                HELD.with(|held| held.set(None));
            }
        });
    }
}
