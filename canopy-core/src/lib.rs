//! Canopy Core
//!
//! Fine-grained reactive state for nested data.
//!
//! The crate has two layers:
//!
//! - `reactive`: signals, effects and the runtime that schedules them
//! - `store`: a tree of plain values whose every position can be read
//!   reactively, with a setter that applies copy-on-write updates and
//!   notifies only the effects whose positions changed
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use canopy_core::reactive::Effect;
//! use canopy_core::store::{create_store, Value};
//! use serde_json::json;
//!
//! let (store, set) = create_store(Value::from(json!({ "user": { "name": "Ada" } })));
//!
//! let seen = Arc::new(AtomicUsize::new(0));
//! let name = store.at(["user", "name"]);
//! let _effect = Effect::new({
//!     let seen = Arc::clone(&seen);
//!     move || {
//!         if name.get().is_some() {
//!             seen.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! });
//!
//! set.set(["user", "name"], "Grace").unwrap();
//! assert_eq!(seen.load(Ordering::SeqCst), 2);
//! ```

pub mod error;
pub mod reactive;
pub mod store;

pub use error::{Result, StoreError};
pub use reactive::{on_cleanup, untrack, Effect, Signal};
pub use store::{batch_updates, create_store, create_store_from, create_store_with, Setter, Store, Value};
