//! Read handles.
//!
//! A [`Store`] is a read-only view of one position in the tree. Navigating
//! it with [`Store::child`] or [`Store::at`] returns another handle, and
//! reading it with [`Store::get`] inside an effect subscribes the effect to
//! that position only.
//!
//! Three kinds of position sit behind a handle:
//!
//! - a materialized node (the common case),
//! - a computed field, evaluated against its owning object on every read,
//! - a trap standing in for an absent or null value. Traps read as absent or
//!   null and navigate to themselves, so deep lookups through missing data
//!   never fail.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::reactive::untrack;

use super::epoch::Epoch;
use super::node::{Lookup, StoreNode};
use super::path::{Key, Path};
use super::value::Value;

pub(crate) trait Accessor: Send + Sync {
    /// Read the value, subscribing the running effect if there is one.
    fn read(&self) -> Option<Value>;

    /// Read the value without subscribing.
    fn read_untracked(&self) -> Option<Value> {
        untrack(|| self.read())
    }

    fn navigate(&self, key: &Key) -> Store;

    fn path(&self) -> Option<Path>;

    fn node(&self) -> Option<&StoreNode> {
        None
    }

    fn is_trap(&self) -> bool {
        false
    }
}

impl Accessor for StoreNode {
    fn read(&self) -> Option<Value> {
        StoreNode::read(self)
    }

    fn read_untracked(&self) -> Option<Value> {
        self.raw()
    }

    fn navigate(&self, key: &Key) -> Store {
        match self.lookup(key) {
            Lookup::Node(child) => Store::from_node(child),
            Lookup::Computed(key) => Store::new(ComputedField {
                owner: self.clone(),
                key,
                rest: Path::root(),
            }),
            Lookup::Absent { null } => {
                // The field may appear later; watch the parent for it.
                self.track();
                if null {
                    Trap::null()
                } else {
                    Trap::undefined()
                }
            }
        }
    }

    fn path(&self) -> Option<Path> {
        Some(StoreNode::path(self))
    }

    fn node(&self) -> Option<&StoreNode> {
        Some(self)
    }
}

/// Stand-in for an absent or null position.
enum Trap {
    Undefined,
    Null,
}

static UNDEFINED: OnceLock<Store> = OnceLock::new();
static NULL: OnceLock<Store> = OnceLock::new();

impl Trap {
    fn undefined() -> Store {
        UNDEFINED.get_or_init(|| Store::new(Trap::Undefined)).clone()
    }

    fn null() -> Store {
        NULL.get_or_init(|| Store::new(Trap::Null)).clone()
    }
}

impl Accessor for Trap {
    fn read(&self) -> Option<Value> {
        match self {
            Trap::Undefined => None,
            Trap::Null => Some(Value::Null),
        }
    }

    fn read_untracked(&self) -> Option<Value> {
        self.read()
    }

    fn navigate(&self, _key: &Key) -> Store {
        match self {
            Trap::Undefined => Trap::undefined(),
            Trap::Null => Trap::null(),
        }
    }

    fn path(&self) -> Option<Path> {
        None
    }

    fn is_trap(&self) -> bool {
        true
    }
}

/// A getter-valued field, or a position below one.
///
/// The getter is looked up on every read, so a handle taken before the field
/// was replaced sees the new getter (or the plain value that replaced it).
struct ComputedField {
    owner: StoreNode,
    key: Key,
    rest: Path,
}

impl Accessor for ComputedField {
    fn read(&self) -> Option<Value> {
        match self.owner.computed_at(&self.key) {
            Some(getter) => {
                let this = Store::from_node(self.owner.clone());
                getter
                    .evaluate(&this)
                    .and_then(|value| value.get_path(&self.rest).cloned())
            }
            None => {
                let mut path = Path::from(self.key.clone());
                for key in &self.rest {
                    path.push(key.clone());
                }
                Store::from_node(self.owner.clone()).at(path).get()
            }
        }
    }

    fn navigate(&self, key: &Key) -> Store {
        let mut rest = self.rest.clone();
        rest.push(key.clone());
        Store::new(ComputedField {
            owner: self.owner.clone(),
            key: self.key.clone(),
            rest,
        })
    }

    fn path(&self) -> Option<Path> {
        let mut path = self.owner.path();
        path.push(self.key.clone());
        for key in &self.rest {
            path.push(key.clone());
        }
        Some(path)
    }
}

/// Read-only handle to a position in a store.
///
/// Handles are cheap to clone. Handles to the same materialized node compare
/// equal under [`Store::ptr_eq`].
#[derive(Clone)]
pub struct Store {
    accessor: Arc<dyn Accessor>,
}

impl Store {
    fn new(accessor: impl Accessor + 'static) -> Self {
        Self {
            accessor: Arc::new(accessor),
        }
    }

    pub(crate) fn from_node(node: StoreNode) -> Self {
        Self::new(node)
    }

    pub(crate) fn node(&self) -> Option<&StoreNode> {
        self.accessor.node()
    }

    /// Read the value at this position.
    ///
    /// Inside an effect this subscribes the effect to this position. Returns
    /// `None` for an absent value.
    pub fn get(&self) -> Option<Value> {
        self.accessor.read()
    }

    /// Read the value without subscribing.
    pub fn get_untracked(&self) -> Option<Value> {
        self.accessor.read_untracked()
    }

    /// Handle for a direct child.
    ///
    /// The handle is bound to the node at that position when it is created.
    /// If the position is later removed, the handle reads `None` for good,
    /// even after a value is written there again. Navigate again to see the
    /// new value; inside an effect, navigate in the effect body so the
    /// effect also subscribes to the parent.
    pub fn child(&self, key: impl Into<Key>) -> Store {
        self.accessor.navigate(&key.into())
    }

    /// Handle for a descendant.
    ///
    /// Bound to its node the same way as [`Store::child`].
    pub fn at(&self, path: impl Into<Path>) -> Store {
        path.into()
            .iter()
            .fold(self.clone(), |store, key| store.accessor.navigate(key))
    }

    /// Length of the array at this position.
    ///
    /// Inside an effect this subscribes to length changes only, not to
    /// element writes.
    pub fn length(&self) -> Option<usize> {
        match self.node() {
            Some(node) => node.length(),
            None => self.get().as_ref().and_then(Value::array_len),
        }
    }

    /// Keys of the value at this position. Subscribes like [`Store::get`].
    pub fn keys(&self) -> Vec<Key> {
        self.get().map(|value| value.keys()).unwrap_or_default()
    }

    /// Epoch of the last write that changed this position.
    pub fn updated_at(&self) -> Option<Epoch> {
        self.node().map(StoreNode::updated_at)
    }

    /// Path of this position from the store root. `None` for handles that
    /// stand in for absent or null values.
    pub fn path(&self) -> Option<Path> {
        self.accessor.path()
    }

    /// True if this handle stands in for an absent or null value.
    pub fn is_absent(&self) -> bool {
        self.accessor.is_trap()
    }

    /// True if both handles address the same position.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        match (self.node(), other.node()) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            _ => Arc::ptr_eq(&self.accessor, &other.accessor),
        }
    }

    /// Read the value and deserialize it.
    ///
    /// Computed fields are left out of the input.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.get()
            .map(|value| serde_json::from_value(value.to_json()))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Always fails: writes go through the [`Setter`](super::Setter).
    pub fn assign(&self, key: impl Into<Key>, _value: impl Into<Value>) -> Result<()> {
        Err(self.refuse(key.into(), "assign"))
    }

    /// Always fails: deletes go through the [`Setter`](super::Setter).
    pub fn delete(&self, key: impl Into<Key>) -> Result<()> {
        Err(self.refuse(key.into(), "delete"))
    }

    fn refuse(&self, key: Key, op: &'static str) -> StoreError {
        let mut path = self.path().unwrap_or_default();
        path.push(key);
        warn!(%path, op, "direct store mutation refused");
        StoreError::MutationNotAllowed { path }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path())
            .field("value", &self.get_untracked())
            .finish()
    }
}
