//! The write half of a store.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::reactive::Runtime;

use super::diff::compare_and_notify;
use super::epoch::{self, Epoch};
use super::node::StoreNode;
use super::path::{Key, Path};
use super::value::{EntryError, Value};

/// How the value at the target path is produced.
enum Update<'a> {
    Assign(Option<Value>),
    With(Box<dyn FnOnce(Option<&Value>) -> Option<Value> + 'a>),
}

impl Update<'_> {
    fn resolve(self, prev: Option<&Value>) -> Option<Value> {
        match self {
            Update::Assign(value) => value,
            Update::With(f) => f(prev),
        }
    }
}

/// Writes to a store.
///
/// Every call advances the write epoch once and applies its change inside a
/// single batch, so effects observing several changed positions re-run once.
/// Writes are validated in full before any node is touched.
///
/// Clones share one write lock, so calls from different threads are applied
/// one at a time. Effects scheduled by a write run after the lock is
/// released.
#[derive(Clone)]
pub struct Setter {
    root: StoreNode,
    name: Arc<str>,
    writing: Arc<Mutex<()>>,
}

impl Setter {
    pub(crate) fn new(root: StoreNode, name: impl Into<Arc<str>>) -> Self {
        Self {
            root,
            name: name.into(),
            writing: Arc::new(Mutex::new(())),
        }
    }

    /// Name the store was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Positional form: every argument but the last is a key, the last is
    /// the new value. `None` as the value removes the entry.
    ///
    /// Keys must be strings or non-negative whole numbers.
    pub fn call<I>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = Option<Value>>,
    {
        let mut args: Vec<Option<Value>> = args.into_iter().collect();
        let value = args
            .pop()
            .ok_or_else(|| StoreError::invalid_call("expected at least one argument"))?;
        let path = args
            .into_iter()
            .enumerate()
            .map(|(position, arg)| key_from_arg(position, arg))
            .collect::<Result<Path>>()?;
        self.write(path, Update::Assign(value))
    }

    /// Write `value` at `path`. Missing or null intermediate positions are
    /// created as empty objects.
    pub fn set(&self, path: impl Into<Path>, value: impl Into<Value>) -> Result<()> {
        self.write(path.into(), Update::Assign(Some(value.into())))
    }

    /// Remove the entry at `path`. Removing an array element shifts the
    /// elements after it.
    pub fn remove(&self, path: impl Into<Path>) -> Result<()> {
        self.write(path.into(), Update::Assign(None))
    }

    /// Compute the new value at `path` from the current one.
    ///
    /// `f` runs while the store is locked for writing and must not write to
    /// the same store.
    pub fn update<F>(&self, path: impl Into<Path>, f: F) -> Result<()>
    where
        F: FnOnce(Option<&Value>) -> Option<Value>,
    {
        self.write(path.into(), Update::With(Box::new(f)))
    }

    /// Replace the whole tree.
    pub fn replace(&self, value: impl Into<Value>) -> Result<()> {
        self.write(Path::root(), Update::Assign(Some(value.into())))
    }

    /// Serialize `value` and write it at `path`.
    pub fn set_from<T: Serialize + ?Sized>(&self, path: impl Into<Path>, value: &T) -> Result<()> {
        let json = serde_json::to_value(value)?;
        self.set(path, Value::from(json))
    }

    fn write(&self, path: Path, update: Update<'_>) -> Result<()> {
        Runtime::batch(|| {
            let _writing = self.writing.lock();
            let epoch = epoch::advance();
            debug!(store = %self.name, %path, %epoch, "store write");
            self.apply(&path, update, epoch)
        })
    }

    fn apply(&self, path: &Path, update: Update<'_>, epoch: Epoch) -> Result<()> {
        if path.is_empty() {
            let prev = self.root.raw();
            let next = update.resolve(prev.as_ref());
            if !Value::same(prev.as_ref(), next.as_ref()) {
                compare_and_notify(&self.root, next, epoch);
            }
            return Ok(());
        }

        // Containers along the path, paired with the normalized key into each.
        let mut spine: Vec<(Value, Key)> = Vec::with_capacity(path.len());
        let mut cursor = self.root.raw();
        for (depth, key) in path.iter().enumerate() {
            let container = match cursor {
                Some(value) if value.is_container() => value,
                None | Some(Value::Null) => Value::empty_object(),
                Some(other) => {
                    return Err(StoreError::NotAContainer {
                        path: path.prefix(depth),
                        found: other.kind(),
                    })
                }
            };
            let key = key.normalize_for(Some(&container));
            cursor = container.get(&key).cloned();
            spine.push((container, key));
        }

        let prev = cursor;
        let next = update.resolve(prev.as_ref());
        if Value::same(prev.as_ref(), next.as_ref()) {
            trace!(%path, "write left value unchanged");
            return Ok(());
        }

        // Rebuild containers bottom-up, sharing everything off the path.
        let mut rebuilt: Vec<Value> = Vec::with_capacity(spine.len());
        let mut entry = next.clone();
        for (depth, (container, key)) in spine.iter().enumerate().rev() {
            let value = container
                .with_entry(key, entry)
                .map_err(|err| entry_error(err, path.prefix(depth), key))?;
            rebuilt.push(value.clone());
            entry = Some(value);
        }
        rebuilt.reverse();

        // Removing an array element shifts its siblings, so the whole array
        // is diffed instead of the single position.
        let last = spine.len() - 1;
        let shifts = next.is_none() && matches!(spine[last].0, Value::Array(_));
        let direct = if shifts { last } else { last + 1 };

        let mut parent: Option<StoreNode> = None;
        let mut node = Some(self.root.clone());
        for depth in 0..direct {
            let Some(current) = node else {
                return Ok(());
            };
            current.commit(Some(rebuilt[depth].clone()), epoch);
            node = current.child_exact(&spine[depth].1);
            parent = Some(current);
        }

        match (node, shifts) {
            (Some(array), true) => {
                compare_and_notify(&array, Some(rebuilt[last].clone()), epoch);
            }
            (Some(leaf), false) => {
                let removed = next.is_none() || next.as_ref().is_some_and(Value::is_computed);
                let target = if removed { None } else { next };
                compare_and_notify(&leaf, target, epoch);
                if removed {
                    if let Some(parent) = parent {
                        parent.detach_exact(&spine[last].1);
                    }
                }
            }
            (None, _) => {}
        }
        Ok(())
    }
}

impl fmt::Debug for Setter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter").field("name", &self.name).finish()
    }
}

fn key_from_arg(position: usize, arg: Option<Value>) -> Result<Key> {
    match arg {
        Some(Value::String(name)) => Ok(Key::Field(name.to_string())),
        Some(Value::Number(n)) if n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64 => {
            Ok(Key::Index(n as usize))
        }
        Some(other) => Err(StoreError::invalid_call(format!(
            "argument {position} is a {}, not a key",
            other.kind()
        ))),
        None => Err(StoreError::invalid_call(format!(
            "argument {position} is absent, not a key"
        ))),
    }
}

fn entry_error(err: EntryError, path: Path, key: &Key) -> StoreError {
    match err {
        EntryError::NotAContainer(found) => StoreError::NotAContainer { path, found },
        EntryError::FieldOnArray => StoreError::InvalidKey {
            path,
            key: key.clone(),
        },
        EntryError::OutOfBounds { index, len } => StoreError::IndexOutOfBounds { path, index, len },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::node::Lookup;
    use serde_json::json;

    fn setter(json: serde_json::Value) -> Setter {
        Setter::new(StoreNode::root(Some(Value::from(json))), "test")
    }

    #[test]
    fn set_rebuilds_only_the_spine() {
        let set = setter(json!({ "a": { "b": 1 }, "c": { "d": 2 } }));
        let before = set.root.raw().unwrap();

        set.set(["a", "b"], 5).unwrap();

        let after = set.root.raw().unwrap();
        assert_eq!(after, json!({ "a": { "b": 5 }, "c": { "d": 2 } }));
        assert!(!before.is_same(&after));
        let c_before = before.get(&Key::field("c")).unwrap();
        let c_after = after.get(&Key::field("c")).unwrap();
        assert!(c_before.is_same(c_after));
    }

    #[test]
    fn missing_and_null_intermediates_become_objects() {
        let set = setter(json!({ "n": null }));
        set.set(["n", "x"], 1).unwrap();
        set.set(["fresh", "y", "z"], true).unwrap();
        assert_eq!(
            set.root.raw().unwrap(),
            json!({ "n": { "x": 1 }, "fresh": { "y": { "z": true } } })
        );
    }

    #[test]
    fn invalid_writes_leave_the_tree_untouched() {
        let set = setter(json!({ "s": "text", "list": [1] }));
        let before = set.root.raw().unwrap();

        let err = set.set(["s", "x"], 1).unwrap_err();
        assert!(matches!(err, StoreError::NotAContainer { found: "string", .. }));

        let err = set.set(Path::root().key("list").index(5), 1).unwrap_err();
        assert!(matches!(err, StoreError::IndexOutOfBounds { index: 5, len: 1, .. }));

        let err = set.set(["list", "name"], 1).unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));

        assert!(set.root.raw().unwrap().is_same(&before));
    }

    #[test]
    fn positional_calls() {
        let set = setter(json!({ "list": ["a", "b"] }));
        set.call([Some(Value::from("list")), Some(Value::from(1)), Some(Value::from("B"))])
            .unwrap();
        assert_eq!(set.root.raw().unwrap(), json!({ "list": ["a", "B"] }));

        set.call([Some(Value::from("list")), Some(Value::from(0)), None]).unwrap();
        assert_eq!(set.root.raw().unwrap(), json!({ "list": ["B"] }));

        assert!(matches!(
            set.call(std::iter::empty::<Option<Value>>()),
            Err(StoreError::InvalidSetterCall { .. })
        ));
        assert!(matches!(
            set.call([Some(Value::from(1.5)), Some(Value::Null)]),
            Err(StoreError::InvalidSetterCall { .. })
        ));
        assert!(matches!(
            set.call([Some(Value::from(true)), Some(Value::Null)]),
            Err(StoreError::InvalidSetterCall { .. })
        ));
    }

    #[test]
    fn single_argument_call_replaces_the_root() {
        let set = setter(json!({ "old": { "v": 1 } }));
        let old = match set.root.lookup(&Key::field("old")) {
            Lookup::Node(node) => node,
            _ => panic!("expected node"),
        };

        set.call([Some(Value::from(json!({ "fresh": true })))]).unwrap();

        assert_eq!(set.root.raw().unwrap(), json!({ "fresh": true }));
        assert_eq!(old.raw(), None);
        assert_eq!(set.root.child_count(), 0);

        set.call([Some(Value::from(7))]).unwrap();
        assert_eq!(set.root.raw(), Some(Value::from(7)));
    }

    #[test]
    fn removal_detaches_the_node() {
        let set = setter(json!({ "a": { "b": 1 } }));
        let a = match set.root.lookup(&Key::field("a")) {
            Lookup::Node(node) => node,
            _ => panic!("expected node"),
        };

        set.remove("a").unwrap();

        assert_eq!(a.raw(), None);
        assert_eq!(set.root.child_count(), 0);
        assert_eq!(set.root.raw().unwrap(), json!({}));
    }

    #[test]
    fn update_sees_the_previous_value() {
        let set = setter(json!({ "count": 1 }));
        set.update("count", |prev| {
            let n = prev.and_then(Value::as_f64).unwrap_or(0.0);
            Some(Value::from(n + 1.0))
        })
        .unwrap();
        assert_eq!(set.root.raw().unwrap(), json!({ "count": 2 }));
    }

    #[test]
    fn set_from_serializes() {
        #[derive(Serialize)]
        struct User {
            name: &'static str,
            age: u32,
        }

        let set = setter(json!({}));
        set.set_from("user", &User { name: "Ada", age: 36 }).unwrap();
        assert_eq!(set.root.raw().unwrap(), json!({ "user": { "name": "Ada", "age": 36 } }));
    }
}
