#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sluice-store-core** – Core storage abstractions for sluice.
//!
//! This crate defines the two persistence contracts everything else builds
//! on: a content-addressed [`ObjectStore`] mapping hashes to immutable
//! values, and a mutable [`RefStore`] mapping hierarchical names to hashes.
//! It also owns value canonicalization and hashing, so every driver agrees
//! on what a value's address is.
//!
//! Concrete drivers (in-memory, filesystem) implement these traits in
//! separate crates that depend on this core abstraction.

use core::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque structured value stored by sluice.
///
/// Maps keep their keys ordered, which is what makes the canonical
/// encoding deterministic.
pub type Value = serde_json::Value;

//─────────────────────────────
//  Value hashing
//─────────────────────────────

/// Number of bytes in a [`ValueHash`] digest.
pub const HASH_LEN: usize = 32;

/// Blake3 digest addressing a stored value.
///
/// Equal values always produce equal hashes; the hex rendering doubles as
/// the on-disk object path of the filesystem driver.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueHash([u8; HASH_LEN]);

impl ValueHash {
    /// Wrap a raw 32-byte digest.
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Render the digest as 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }

    /// Parse a digest from its hex rendering.
    pub fn from_hex(hex: &str) -> Result<Self, StoreError> {
        let hash = blake3::Hash::from_hex(hex)
            .map_err(|e| StoreError::MalformedHash(e.to_string()))?;
        Ok(Self(*hash.as_bytes()))
    }
}

impl fmt::Display for ValueHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ValueHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueHash({})", self.to_hex())
    }
}

/// Canonical byte encoding of a value.
///
/// Object files store exactly these bytes, and [`hash_value`] digests them,
/// so the encoding must be deterministic: JSON with ordered object keys.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Decode a value from its canonical bytes.
pub fn decode_value(bytes: &[u8]) -> Result<Value, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Hash raw canonical bytes.
pub fn hash_bytes(bytes: &[u8]) -> ValueHash {
    ValueHash(*blake3::hash(bytes).as_bytes())
}

/// Compute the content address of a value.
pub fn hash_value(value: &Value) -> Result<ValueHash, StoreError> {
    Ok(hash_bytes(&canonical_bytes(value)?))
}

//─────────────────────────────
//  Ref names
//─────────────────────────────

/// Validate a ref name: non-empty `/`-separated segments.
///
/// `.` and `..` segments are rejected so the filesystem driver can map
/// names straight onto paths without escaping its base directory.
pub fn validate_ref_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidRefName {
            name: name.to_owned(),
            reason: "name is empty",
        });
    }
    for segment in name.split('/') {
        if segment.is_empty() {
            return Err(StoreError::InvalidRefName {
                name: name.to_owned(),
                reason: "empty path segment",
            });
        }
        if segment == "." || segment == ".." {
            return Err(StoreError::InvalidRefName {
                name: name.to_owned(),
                reason: "relative path segment",
            });
        }
    }
    Ok(())
}

/// Validate a listing prefix.
///
/// Prefixes are looser than names: empty matches everything and a trailing
/// `/` (producing an empty final segment) is how callers scope a subtree.
/// Only `.` and `..` segments are rejected.
pub fn validate_ref_prefix(prefix: &str) -> Result<(), StoreError> {
    for segment in prefix.split('/') {
        if segment == "." || segment == ".." {
            return Err(StoreError::InvalidRefName {
                name: prefix.to_owned(),
                reason: "relative path segment",
            });
        }
    }
    Ok(())
}

//─────────────────────────────
//  Storage traits
//─────────────────────────────

/// Abstraction over a content-addressed object repository.
///
/// A store is insertion-monotonic: once a hash maps to a value the binding
/// never changes and never disappears for the store's lifetime. There is no
/// delete and no enumeration.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a value and return its content address.
    ///
    /// Putting an already-present value is idempotent and returns the same
    /// hash. Fails with [`StoreError::Serialization`] if the value cannot
    /// be canonically encoded.
    async fn put(&self, value: &Value) -> anyhow::Result<ValueHash>;

    /// Fetch the value bound to `hash`, or `None` if the store has never
    /// seen it.
    async fn get(&self, hash: &ValueHash) -> anyhow::Result<Option<Value>>;
}

/// Abstraction over a mutable name → hash mapping with prefix listing.
#[async_trait]
pub trait RefStore: Send + Sync {
    /// Create or overwrite the binding for `name`.
    async fn set(&self, name: &str, hash: ValueHash) -> anyhow::Result<()>;

    /// Fetch the hash bound to `name`, or `None` when unbound.
    async fn get(&self, name: &str) -> anyhow::Result<Option<ValueHash>>;

    /// Remove the binding for `name`. Deleting an absent name is a no-op.
    async fn delete(&self, name: &str) -> anyhow::Result<()>;

    /// List every bound name starting with `prefix`, sorted ascending.
    ///
    /// The empty prefix lists the whole mapping. Results never contain
    /// duplicates.
    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>>;
}

//─────────────────────────────
//  Error types
//─────────────────────────────

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Value could not be canonically encoded or decoded.
    #[error("failed to canonicalize value: {0}")]
    Serialization(String),
    /// Ref name violates the naming rules.
    #[error("invalid ref name {name:?}: {reason}")]
    InvalidRefName {
        /// The offending name.
        name: String,
        /// Which rule it broke.
        reason: &'static str,
    },
    /// Hash text is not a valid 64-char hex digest.
    #[error("malformed hash: {0}")]
    MalformedHash(String),
    /// Object file exists but its bytes do not decode.
    #[error("corrupt object {hash}: {reason}")]
    CorruptObject {
        /// Hex address of the object.
        hash: String,
        /// Decode failure detail.
        reason: String,
    },
    /// Ref file exists but does not contain a hash.
    #[error("corrupt ref {name:?}: {reason}")]
    CorruptRef {
        /// Logical name of the ref.
        name: String,
        /// Parse failure detail.
        reason: String,
    },
}

//─────────────────────────────
//  Convenience re-exports
//─────────────────────────────

/// Convenient prelude for importing the most common types.
pub mod prelude {
    pub use super::{
        canonical_bytes, decode_value, hash_bytes, hash_value, validate_ref_name,
        validate_ref_prefix, ObjectStore, RefStore, StoreError, Value, ValueHash, HASH_LEN,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_deterministic() {
        let value = json!({"name": "users", "columns": ["id", "name"]});
        let h1 = hash_value(&value).unwrap();
        let h2 = hash_value(&value).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_hash_key_order_insensitive() {
        // serde_json maps are ordered, so construction order must not leak
        // into the digest.
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
    }

    #[test]
    fn test_distinct_values_distinct_hashes() {
        let h1 = hash_value(&json!({"val": 1})).unwrap();
        let h2 = hash_value(&json!({"val": 2})).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = hash_value(&json!([1, 2, 3])).unwrap();
        let hex = hash.to_hex();
        assert_eq!(hex.len(), HASH_LEN * 2);
        assert_eq!(ValueHash::from_hex(&hex).unwrap(), hash);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(matches!(
            ValueHash::from_hex("not-a-hash"),
            Err(StoreError::MalformedHash(_))
        ));
    }

    #[test]
    fn test_canonical_round_trip() {
        let value = json!({"nested": {"list": [null, true, 1.5, "x"]}});
        let bytes = canonical_bytes(&value).unwrap();
        assert_eq!(decode_value(&bytes).unwrap(), value);
    }

    #[test]
    fn test_ref_name_validation() {
        assert!(validate_ref_name("db/tables/users/schema").is_ok());
        assert!(validate_ref_name("counter").is_ok());
        assert!(validate_ref_name("").is_err());
        assert!(validate_ref_name("a//b").is_err());
        assert!(validate_ref_name("/a").is_err());
        assert!(validate_ref_name("a/").is_err());
        assert!(validate_ref_name("../escape").is_err());
        assert!(validate_ref_name("a/./b").is_err());
    }

    #[test]
    fn test_ref_prefix_validation() {
        assert!(validate_ref_prefix("").is_ok());
        assert!(validate_ref_prefix("db/tables/").is_ok());
        assert!(validate_ref_prefix("db/tab").is_ok());
        assert!(validate_ref_prefix("../escape").is_err());
    }
}
