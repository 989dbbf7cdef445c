//! Reactive stores.
//!
//! A store holds a tree of plain values (see [`Value`]) and hands out two
//! halves: a read-only [`Store`] handle and a [`Setter`]. Reading through the
//! handle inside an effect subscribes the effect to exactly the positions it
//! read, and a write through the setter notifies only the effects whose
//! positions changed.
//!
//! # Example
//!
//! ```rust
//! use canopy_core::reactive::Effect;
//! use canopy_core::store::{create_store, Value};
//! use serde_json::json;
//!
//! let (store, set) = create_store(Value::from(json!({
//!     "data": { "message": "Hello!" },
//!     "other": 1,
//! })));
//!
//! let effect = Effect::new({
//!     let store = store.clone();
//!     move || {
//!         let _ = store.at(["data", "message"]).get();
//!     }
//! });
//!
//! set.set("other", 2).unwrap();
//! assert_eq!(effect.run_count(), 1);
//!
//! set.set(["data", "message"], "Bye!").unwrap();
//! assert_eq!(effect.run_count(), 2);
//! ```
//!
//! Handles are bound to nodes: one taken before its position is removed
//! keeps reading `None` after the position is written again. Navigating
//! inside the effect, as above, always reaches the current node.

mod accessor;
mod diff;
pub mod epoch;
mod node;
mod path;
mod setter;
mod value;

pub use accessor::Store;
pub use epoch::Epoch;
pub use path::{Key, Path};
pub use setter::Setter;
pub use value::{Computed, Map, Value};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::reactive::Runtime;

use epoch::ClockHold;
use node::StoreNode;

/// Options for [`create_store_with`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Name used in log output.
    pub name: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store's name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Create a store holding `initial`.
pub fn create_store(initial: impl Into<Value>) -> (Store, Setter) {
    create_store_with(initial, StoreOptions::default())
}

/// Create a store with explicit options.
pub fn create_store_with(initial: impl Into<Value>, options: StoreOptions) -> (Store, Setter) {
    let root = StoreNode::root(Some(initial.into()));
    debug!(store = %options.name, "store created");
    (Store::from_node(root.clone()), Setter::new(root, options.name))
}

/// Create a store from any serializable value.
pub fn create_store_from<T: Serialize + ?Sized>(initial: &T) -> Result<(Store, Setter)> {
    let json = serde_json::to_value(initial)?;
    Ok(create_store(Value::from(json)))
}

/// Run `f` with every setter call inside it sharing one epoch and one batch.
///
/// Effects observing the changed positions re-run once, after `f` returns.
pub fn batch_updates<R>(f: impl FnOnce() -> R) -> R {
    Runtime::batch(|| {
        let hold = ClockHold::begin();
        debug!(epoch = %hold.epoch(), "batched store updates");
        f()
    })
}
