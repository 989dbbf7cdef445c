//! Change propagation.
//!
//! After a write, the new value of a subtree is compared against the raw
//! values held by its materialized nodes. Only nodes whose value actually
//! changed (by identity) are notified, and subtrees nobody ever navigated
//! into are skipped entirely.

use super::epoch::Epoch;
use super::node::StoreNode;
use super::path::Key;
use super::value::Value;

/// Bring `node` and its materialized descendants up to date with `next`.
///
/// Children are visited before the node itself. Children whose key no
/// longer exists, or whose new value is a getter, are notified with `None`
/// and dropped from the node's cache. Getters are never evaluated here.
///
/// When the value switches between array and object, children are re-keyed
/// first, so `["a"]` and `{"0": "a"}` keep the same child for `"a"`.
pub(crate) fn compare_and_notify(node: &StoreNode, next: Option<Value>, epoch: Epoch) {
    let prev = node.raw();
    if Value::same(prev.as_ref(), next.as_ref()) {
        return;
    }

    let prev_container = prev.as_ref().filter(|value| value.is_container());
    let next_container = next.as_ref().filter(|value| value.is_container());

    if prev_container.is_some() || next_container.is_some() {
        let to_array = matches!(next_container, Some(Value::Array(_)));
        let from_array = matches!(prev_container, Some(Value::Array(_)));
        if prev_container.is_some() && next_container.is_some() && to_array != from_array {
            node.rekey_children(to_array);
        }

        for key in node.child_keys() {
            let Some(child) = node.child_exact(&key) else {
                continue;
            };
            let entry = match (next_container, &key) {
                // Non-index field names have no position in an array.
                (Some(Value::Array(_)), Key::Field(_)) => None,
                (Some(value), _) => value.get(&key),
                (None, _) => None,
            };
            match entry {
                None | Some(Value::Computed(_)) => {
                    node.detach_exact(&key);
                    compare_and_notify(&child, None, epoch);
                }
                Some(entry) => compare_and_notify(&child, Some(entry.clone()), epoch),
            }
        }
    }

    node.commit(next, epoch);
}
