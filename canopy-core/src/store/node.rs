//! Store nodes.
//!
//! A node stands for one position in the value tree. It holds the current
//! raw value at that position, the child nodes that have been materialized
//! so far, and, once somebody has read it inside an effect, a signal that
//! carries the epoch of the node's last change.
//!
//! Children are created on first navigation and only for fields that hold a
//! non-null, non-computed value. A node that was never read reactively has
//! no signal at all.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use crate::reactive::{Runtime, Signal};

use super::epoch::{self, Epoch};
use super::path::{Key, Path};
use super::value::Value;

struct NodeInner {
    /// Key within the parent; `None` for the root. Rewritten when the parent
    /// changes between array and object.
    key: RwLock<Option<Key>>,
    parent: Weak<NodeInner>,
    state: RwLock<NodeState>,
}

struct NodeState {
    raw: Option<Value>,
    /// Keyed in normalized form: `Index` under arrays, `Field` otherwise.
    children: HashMap<Key, StoreNode>,
    signal: Option<Signal<Epoch>>,
    length: Option<Signal<Option<usize>>>,
    updated_at: Epoch,
}

/// Result of navigating one key down from a node.
pub(crate) enum Lookup {
    Node(StoreNode),
    /// The field holds a getter; the key is normalized.
    Computed(Key),
    Absent { null: bool },
}

#[derive(Clone)]
pub(crate) struct StoreNode {
    inner: Arc<NodeInner>,
}

impl StoreNode {
    pub(crate) fn root(value: Option<Value>) -> Self {
        Self::build(None, Weak::new(), value)
    }

    fn build(key: Option<Key>, parent: Weak<NodeInner>, value: Option<Value>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                key: RwLock::new(key),
                parent,
                state: RwLock::new(NodeState {
                    raw: value,
                    children: HashMap::new(),
                    signal: None,
                    length: None,
                    updated_at: epoch::current(),
                }),
            }),
        }
    }

    pub(crate) fn ptr_eq(&self, other: &StoreNode) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Path from the root, rebuilt by walking parent links.
    pub(crate) fn path(&self) -> Path {
        let mut keys = Vec::new();
        let mut cursor = Some(Arc::clone(&self.inner));
        while let Some(node) = cursor {
            if let Some(key) = node.key.read().clone() {
                keys.push(key);
            }
            cursor = node.parent.upgrade();
        }
        keys.into_iter().rev().collect()
    }

    /// Current raw value, never tracked.
    pub(crate) fn raw(&self) -> Option<Value> {
        self.inner.state.read().raw.clone()
    }

    pub(crate) fn updated_at(&self) -> Epoch {
        self.inner.state.read().updated_at
    }

    /// Subscribe the running effect to this node, creating the node's signal
    /// on first use. A no-op outside a tracking context.
    pub(crate) fn track(&self) {
        if !Runtime::is_tracking() {
            return;
        }
        let signal = {
            let mut state = self.inner.state.write();
            let seed = state.updated_at;
            state.signal.get_or_insert_with(|| Signal::new(seed)).clone()
        };
        signal.get();
    }

    /// Raw value, subscribing the running effect if there is one.
    pub(crate) fn read(&self) -> Option<Value> {
        self.track();
        self.raw()
    }

    /// Array length, subscribing only to length changes.
    pub(crate) fn length(&self) -> Option<usize> {
        if !Runtime::is_tracking() {
            return self.inner.state.read().raw.as_ref().and_then(Value::array_len);
        }
        let signal = {
            let mut state = self.inner.state.write();
            let seed = state.raw.as_ref().and_then(Value::array_len);
            state.length.get_or_insert_with(|| Signal::new(seed)).clone()
        };
        signal.get()
    }

    /// Navigate one key down, materializing the child node if needed.
    pub(crate) fn lookup(&self, key: &Key) -> Lookup {
        let mut guard = self.inner.state.write();
        let state = &mut *guard;
        let key = key.normalize_for(state.raw.as_ref());

        match state.raw.as_ref().and_then(|raw| raw.get(&key)) {
            None => Lookup::Absent { null: false },
            Some(Value::Null) => Lookup::Absent { null: true },
            Some(Value::Computed(_)) => Lookup::Computed(key),
            Some(value) => {
                let child = state
                    .children
                    .entry(key)
                    .or_insert_with_key(|key| {
                        StoreNode::build(
                            Some(key.clone()),
                            Arc::downgrade(&self.inner),
                            Some(value.clone()),
                        )
                    })
                    .clone();
                Lookup::Node(child)
            }
        }
    }

    /// Getter stored under `key`, if the field is computed.
    pub(crate) fn computed_at(&self, key: &Key) -> Option<super::value::Computed> {
        let state = self.inner.state.read();
        match state.raw.as_ref().and_then(|raw| raw.get(key)) {
            Some(Value::Computed(getter)) => Some(getter.clone()),
            _ => None,
        }
    }

    /// Materialized child under an already-normalized key.
    pub(crate) fn child_exact(&self, key: &Key) -> Option<StoreNode> {
        self.inner.state.read().children.get(key).cloned()
    }

    /// Keys of the materialized children, sorted.
    pub(crate) fn child_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.inner.state.read().children.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Re-key the materialized children for a container of the other kind:
    /// `Field("1")` becomes `Index(1)` under an array, and `Index(1)` becomes
    /// `Field("1")` under an object. Field names that are not indexes keep
    /// their key and are torn down by the diff.
    pub(crate) fn rekey_children(&self, to_array: bool) {
        let mut state = self.inner.state.write();
        let children = std::mem::take(&mut state.children);
        state.children = children
            .into_iter()
            .map(|(key, child)| {
                let key = match key {
                    Key::Field(name) if to_array => match name.parse::<usize>() {
                        Ok(i) if i.to_string() == name => Key::Index(i),
                        _ => Key::Field(name),
                    },
                    Key::Index(i) if !to_array => Key::Field(i.to_string()),
                    other => other,
                };
                *child.inner.key.write() = Some(key.clone());
                (key, child)
            })
            .collect();
    }

    /// Drop a materialized child from the cache.
    pub(crate) fn detach_exact(&self, key: &Key) -> Option<StoreNode> {
        self.inner.state.write().children.remove(key)
    }

    /// Replace the raw value and notify subscribers.
    ///
    /// The node's signal receives the new epoch; the length signal fires
    /// only if the array length changed.
    pub(crate) fn commit(&self, value: Option<Value>, epoch: Epoch) {
        let (signal, length) = {
            let mut state = self.inner.state.write();
            let old_len = state.raw.as_ref().and_then(Value::array_len);
            let new_len = value.as_ref().and_then(Value::array_len);
            state.raw = value;
            state.updated_at = epoch;
            let length = if old_len != new_len {
                state.length.clone().map(|signal| (signal, new_len))
            } else {
                None
            };
            (state.signal.clone(), length)
        };

        trace!(path = %self.path(), %epoch, "node changed");

        if let Some((signal, len)) = length {
            signal.set(len);
        }
        if let Some(signal) = signal {
            signal.set(epoch);
        }
    }

    #[cfg(test)]
    pub(crate) fn child_count(&self) -> usize {
        self.inner.state.read().children.len()
    }

    #[cfg(test)]
    pub(crate) fn has_signal(&self) -> bool {
        self.inner.state.read().signal.is_some()
    }
}

impl std::fmt::Debug for StoreNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("StoreNode")
            .field("key", &*self.inner.key.read())
            .field("raw", &state.raw)
            .field("children", &state.children.len())
            .field("updated_at", &state.updated_at)
            .finish()
    }
}
