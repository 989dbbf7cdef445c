//! Paths into the value tree.
//!
//! A path is a sequence of keys. Each key is either an object field or an
//! array index. Keys are normalized against the container they index into,
//! so `"0"` and `0` address the same array element.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::value::Value;

/// A single step into an object or array.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Object field access.
    Field(String),
    /// Array index access.
    Index(usize),
}

impl Key {
    /// Create a field key.
    #[inline]
    pub fn field(name: impl Into<String>) -> Self {
        Key::Field(name.into())
    }

    /// Create an index key.
    #[inline]
    pub fn index(i: usize) -> Self {
        Key::Index(i)
    }

    /// Interpret the key as an array index, if it is one or parses as one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Field(name) => name.parse().ok(),
        }
    }

    /// The key as an object field name.
    pub fn to_field(&self) -> String {
        match self {
            Key::Field(name) => name.clone(),
            Key::Index(i) => i.to_string(),
        }
    }

    /// The canonical form of this key for the given container.
    ///
    /// Arrays are indexed by position; everything else by field name.
    pub(crate) fn normalize_for(&self, container: Option<&Value>) -> Key {
        match (container, self) {
            (Some(Value::Array(_)), _) => match self.as_index() {
                Some(i) => Key::Index(i),
                None => self.clone(),
            },
            (_, Key::Index(i)) => Key::Field(i.to_string()),
            (_, Key::Field(_)) => self.clone(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => write!(f, ".{}", name),
            Key::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Field(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Field(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Field(s.clone())
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

/// A location in the value tree, relative to the store root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path(SmallVec<[Key; 8]>);

impl Path {
    /// The empty path, addressing the root.
    #[inline]
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    /// Append a field key (builder style).
    #[inline]
    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.0.push(Key::Field(name.into()));
        self
    }

    /// Append an index key (builder style).
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Key::Index(i));
        self
    }

    /// Append a key in place.
    #[inline]
    pub fn push(&mut self, key: impl Into<Key>) {
        self.0.push(key.into());
    }

    /// Remove and return the last key.
    #[inline]
    pub fn pop(&mut self) -> Option<Key> {
        self.0.pop()
    }

    /// Number of keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the root path.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The last key, if any.
    #[inline]
    pub fn last(&self) -> Option<&Key> {
        self.0.last()
    }

    /// Iterate over the keys.
    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.0.iter()
    }

    /// The keys as a slice.
    pub fn as_slice(&self) -> &[Key] {
        &self.0
    }

    /// The first `len` keys as a new path.
    pub fn prefix(&self, len: usize) -> Path {
        Path(self.0.iter().take(len).cloned().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for key in &self.0 {
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Key> for Path {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl From<Key> for Path {
    fn from(key: Key) -> Self {
        Path(smallvec::smallvec![key])
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::from(Key::from(s))
    }
}

impl From<usize> for Path {
    fn from(i: usize) -> Self {
        Path::from(Key::Index(i))
    }
}

impl<K: Into<Key>, const N: usize> From<[K; N]> for Path {
    fn from(keys: [K; N]) -> Self {
        keys.into_iter().map(Into::into).collect()
    }
}

impl<K: Into<Key>> From<Vec<K>> for Path {
    fn from(keys: Vec<K>) -> Self {
        keys.into_iter().map(Into::into).collect()
    }
}

impl From<&Path> for Path {
    fn from(path: &Path) -> Self {
        path.clone()
    }
}
