//! Error types for store operations.

use thiserror::Error;

use crate::store::{Key, Path};

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the store.
///
/// Every error is reported before any node has been touched, so a failed
/// write leaves the tree exactly as it was.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write was attempted through a read handle instead of the setter.
    #[error("can't edit store directly at {path}; use the setter")]
    MutationNotAllowed {
        /// Path of the handle the write was attempted on.
        path: Path,
    },

    /// The setter was called with arguments it cannot interpret.
    #[error("invalid setter call: {reason}")]
    InvalidSetterCall {
        /// What was wrong with the arguments.
        reason: String,
    },

    /// A path walked through a value that cannot hold children.
    #[error("value at {path} is a {found}, not an object or array")]
    NotAContainer {
        /// Path of the offending value.
        path: Path,
        /// Kind of value found there.
        found: &'static str,
    },

    /// An array write landed past the end of the array.
    #[error("index {index} out of bounds (len: {len}) at {path}")]
    IndexOutOfBounds {
        /// Path of the array.
        path: Path,
        /// The index that was written.
        index: usize,
        /// The array's length.
        len: usize,
    },

    /// A field name was used to index into an array.
    #[error("key {key} can't index the array at {path}")]
    InvalidKey {
        /// Path of the array.
        path: Path,
        /// The offending key.
        key: Key,
    },

    /// Converting between a typed value and the store's value tree failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create an invalid setter call error.
    pub fn invalid_call(reason: impl Into<String>) -> Self {
        StoreError::InvalidSetterCall {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_error_names_the_path() {
        let err = StoreError::MutationNotAllowed {
            path: Path::root().key("data").index(2),
        };
        let msg = err.to_string();
        assert!(msg.contains("can't edit store directly"));
        assert!(msg.contains("$.data[2]"));
    }

    #[test]
    fn bounds_error_display() {
        let err = StoreError::IndexOutOfBounds {
            path: Path::root().key("items"),
            index: 5,
            len: 2,
        };
        assert_eq!(err.to_string(), "index 5 out of bounds (len: 2) at $.items");
    }

    #[test]
    fn invalid_call_helper() {
        let err = StoreError::invalid_call("no arguments");
        assert!(matches!(err, StoreError::InvalidSetterCall { .. }));
        assert_eq!(err.to_string(), "invalid setter call: no arguments");
    }
}
