//! The dynamic value tree held by a store.
//!
//! Containers are reference counted and never mutated in place: a write
//! builds a new container and leaves the old one intact, so a reader holding
//! an earlier value keeps a stable snapshot. Identity of containers is
//! therefore meaningful, and [`Value::is_same`] compares by identity while
//! `PartialEq` compares structurally.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::accessor::Store;
use super::path::Key;

/// Ordered field map of an object value.
pub type Map = IndexMap<String, Value>;

/// A getter-valued field.
///
/// The getter is evaluated when the field is read, with a handle to the
/// object that owns the field, so it can read its siblings reactively. The
/// store never evaluates it while applying a write.
#[derive(Clone)]
pub struct Computed(Arc<dyn Fn(&Store) -> Option<Value> + Send + Sync>);

impl Computed {
    /// Wrap a getter.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn(&Store) -> Option<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(getter))
    }

    /// Evaluate the getter against its owning object.
    pub fn evaluate(&self, this: &Store) -> Option<Value> {
        (self.0)(this)
    }

    /// True if both handles wrap the same getter.
    pub fn ptr_eq(&self, other: &Computed) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Computed({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// A node of the value tree.
///
/// An absent value ("undefined") is represented by `Option::None` at the
/// use site, not by a variant.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<Map>),
    Computed(Computed),
}

/// Why a container can't take a new entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EntryError {
    NotAContainer(&'static str),
    FieldOnArray,
    OutOfBounds { index: usize, len: usize },
}

impl Value {
    /// Build an object from key/value pairs, keeping their order.
    pub fn object<K, V, I>(entries: I) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Build an array from its elements.
    pub fn array<V, I>(items: I) -> Value
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Array(Arc::new(items.into_iter().map(Into::into).collect()))
    }

    /// An empty object.
    pub fn empty_object() -> Value {
        Value::Object(Arc::new(Map::new()))
    }

    /// A getter-valued field. See [`Computed`].
    pub fn computed<F>(getter: F) -> Value
    where
        F: Fn(&Store) -> Option<Value> + Send + Sync + 'static,
    {
        Value::Computed(Computed::new(getter))
    }

    /// Short name of the variant, used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Computed(_) => "computed",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Objects and arrays can hold children.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Value::Computed(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(&**map),
            _ => None,
        }
    }

    /// Length of an array value.
    pub fn array_len(&self) -> Option<usize> {
        self.as_array().map(<[Value]>::len)
    }

    /// Look up a direct child.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        match self {
            Value::Object(map) => match key {
                Key::Field(name) => map.get(name),
                Key::Index(i) => map.get(&i.to_string()),
            },
            Value::Array(items) => key.as_index().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Look up a descendant.
    pub fn get_path<'a>(&self, keys: impl IntoIterator<Item = &'a Key>) -> Option<&Value> {
        keys.into_iter().try_fold(self, |value, key| value.get(key))
    }

    /// Keys of the direct children, in the form the store indexes them by.
    pub fn keys(&self) -> Vec<Key> {
        match self {
            Value::Object(map) => map.keys().map(|k| Key::Field(k.clone())).collect(),
            Value::Array(items) => (0..items.len()).map(Key::Index).collect(),
            _ => Vec::new(),
        }
    }

    /// Identity comparison.
    ///
    /// Containers and getters are the same only if they are the same
    /// allocation. Numbers follow `Object.is`: every NaN is the same as every
    /// other NaN, and `0.0` is not the same as `-0.0`.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Computed(a), Value::Computed(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Identity comparison of possibly-absent values.
    pub fn same(a: Option<&Value>, b: Option<&Value>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a.is_same(b),
            _ => false,
        }
    }

    /// Copy of this container with one entry replaced, inserted or removed.
    ///
    /// Untouched entries are shared with `self`. Removing an array element
    /// shifts the following elements down.
    pub(crate) fn with_entry(&self, key: &Key, entry: Option<Value>) -> Result<Value, EntryError> {
        match self {
            Value::Object(map) => {
                let field = key.to_field();
                let mut next = (**map).clone();
                match entry {
                    Some(value) => {
                        next.insert(field, value);
                    }
                    None => {
                        next.shift_remove(&field);
                    }
                }
                Ok(Value::Object(Arc::new(next)))
            }
            Value::Array(items) => {
                let index = key.as_index().ok_or(EntryError::FieldOnArray)?;
                let len = items.len();
                let mut next = (**items).clone();
                match entry {
                    Some(value) if index < len => next[index] = value,
                    Some(value) if index == len => next.push(value),
                    Some(_) => return Err(EntryError::OutOfBounds { index, len }),
                    None if index < len => {
                        next.remove(index);
                    }
                    None => {}
                }
                Ok(Value::Array(Arc::new(next)))
            }
            other => Err(EntryError::NotAContainer(other.kind())),
        }
    }

    /// Convert to JSON. Computed fields are left out; a computed value in
    /// any other position becomes `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Computed(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_computed())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Whole numbers within the exactly-representable range become JSON
/// integers; non-finite numbers become `null`.
fn number_to_json(n: f64) -> serde_json::Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Structural equality. Computed fields are equal only to themselves.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Computed(a), Value::Computed(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => Value::array(items),
            serde_json::Value::Object(map) => Value::object(map),
        }
    }
}

impl PartialEq<serde_json::Value> for Value {
    fn eq(&self, other: &serde_json::Value) -> bool {
        self.to_json() == *other
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(Arc::new(map))
    }
}

impl From<Computed> for Value {
    fn from(computed: Computed) -> Self {
        Value::Computed(computed)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Value::array(items)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(f32, i32, i64, u32, u64, usize);
