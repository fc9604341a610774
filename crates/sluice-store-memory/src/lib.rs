#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sluice-store-memory** – In-memory storage drivers for sluice.
//!
//! This crate provides fast, non-persistent implementations of the core
//! storage traits, suitable for testing, development, and embedders that
//! don't need their state to outlive the process. All data is lost when the
//! process terminates.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use sluice_store_core::{
    hash_value, validate_ref_name, validate_ref_prefix, ObjectStore, RefStore, Value, ValueHash,
};

//─────────────────────────────
//  In-memory object store
//─────────────────────────────

/// An in-memory, non-persistent content-addressed object store.
///
/// Values live in a hash map keyed by their content address. Cloning the
/// store clones the handle, not the contents, so several components can
/// share one store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<ValueHash, Value>>>,
}

impl MemoryStore {
    /// Creates a new, empty in-memory object store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current number of stored objects.
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, value: &Value) -> Result<ValueHash> {
        let hash = hash_value(value)?;
        // Insert-if-absent keeps the binding immutable and makes repeated
        // puts of the same value idempotent.
        self.objects
            .write()
            .await
            .entry(hash)
            .or_insert_with(|| value.clone());
        Ok(hash)
    }

    async fn get(&self, hash: &ValueHash) -> Result<Option<Value>> {
        Ok(self.objects.read().await.get(hash).cloned())
    }
}

//─────────────────────────────
//  In-memory ref store
//─────────────────────────────

/// An in-memory, non-persistent name → hash mapping.
///
/// Bindings live in an ordered map, so prefix listing is a single range
/// scan that comes out sorted for free.
#[derive(Debug, Clone, Default)]
pub struct MemoryRefs {
    refs: Arc<RwLock<BTreeMap<String, ValueHash>>>,
}

impl MemoryRefs {
    /// Creates a new, empty in-memory ref store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current number of bound refs.
    pub async fn ref_count(&self) -> usize {
        self.refs.read().await.len()
    }
}

#[async_trait]
impl RefStore for MemoryRefs {
    async fn set(&self, name: &str, hash: ValueHash) -> Result<()> {
        validate_ref_name(name)?;
        self.refs.write().await.insert(name.to_owned(), hash);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<ValueHash>> {
        validate_ref_name(name)?;
        Ok(self.refs.read().await.get(name).copied())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        validate_ref_name(name)?;
        self.refs.write().await.remove(name);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        validate_ref_prefix(prefix)?;
        let refs = self.refs.read().await;
        Ok(refs
            .range(prefix.to_owned()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect())
    }
}
