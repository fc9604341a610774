#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sluice-store-fs** – Filesystem-backed storage drivers for sluice.
//!
//! Objects live under `<base>/objects/<hh>/<rest>` where `<hh>` is the
//! first two hex characters of the hash (a fan-out directory) and `<rest>`
//! the remaining 62; file bytes are the canonical serialization. Refs live
//! under `<base>/refs/<name>` with the name's `/` segments mapped onto
//! directories and the hash hex as file contents.
//!
//! The on-disk tree is a faithful projection of the abstract mappings:
//! one file per stored object, one file per bound ref, and no emptied
//! directories left behind after a delete.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

use sluice_store_core::{
    canonical_bytes, decode_value, hash_bytes, validate_ref_name, validate_ref_prefix,
    ObjectStore, RefStore, StoreError, Value, ValueHash,
};

//─────────────────────────────
//  Filesystem object store
//─────────────────────────────

/// A content-addressed object store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    objects_dir: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `base`, creating `<base>/objects` if absent.
    pub fn open(base: impl AsRef<Path>) -> Result<Self> {
        let objects_dir = base.as_ref().join("objects");
        std::fs::create_dir_all(&objects_dir)
            .with_context(|| format!("failed to create {}", objects_dir.display()))?;
        Ok(Self { objects_dir })
    }

    fn object_path(&self, hash: &ValueHash) -> PathBuf {
        let hex = hash.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn put(&self, value: &Value) -> Result<ValueHash> {
        let bytes = canonical_bytes(value)?;
        let hash = hash_bytes(&bytes);
        let path = self.object_path(&hash);

        // A present object is never rewritten.
        if fs::try_exists(&path).await? {
            return Ok(hash);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Stage to a sibling and rename so a crash mid-write never leaves a
        // partial file under the final content address.
        let staged = path.with_extension("tmp");
        fs::write(&staged, &bytes).await?;
        fs::rename(&staged, &path).await?;
        Ok(hash)
    }

    async fn get(&self, hash: &ValueHash) -> Result<Option<Value>> {
        match fs::read(self.object_path(hash)).await {
            Ok(bytes) => {
                let value = decode_value(&bytes).map_err(|e| StoreError::CorruptObject {
                    hash: hash.to_hex(),
                    reason: e.to_string(),
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

//─────────────────────────────
//  Filesystem ref store
//─────────────────────────────

/// A name → hash mapping stored as one regular file per ref.
#[derive(Debug, Clone)]
pub struct FsRefs {
    refs_dir: PathBuf,
}

impl FsRefs {
    /// Open a ref store rooted at `base`, creating `<base>/refs` if absent.
    pub fn open(base: impl AsRef<Path>) -> Result<Self> {
        let refs_dir = base.as_ref().join("refs");
        std::fs::create_dir_all(&refs_dir)
            .with_context(|| format!("failed to create {}", refs_dir.display()))?;
        Ok(Self { refs_dir })
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        name.split('/').fold(self.refs_dir.clone(), |p, seg| p.join(seg))
    }

    /// Remove ancestor directories of `path` that the delete emptied,
    /// stopping at the refs root or the first non-empty directory.
    async fn prune_empty_dirs(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.refs_dir {
                break;
            }
            // remove_dir refuses non-empty directories, which is exactly
            // the stopping condition.
            if fs::remove_dir(d).await.is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

#[async_trait]
impl RefStore for FsRefs {
    async fn set(&self, name: &str, hash: ValueHash) -> Result<()> {
        validate_ref_name(name)?;
        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, hash.to_hex().as_bytes()).await?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<ValueHash>> {
        validate_ref_name(name)?;
        match fs::read_to_string(self.ref_path(name)).await {
            Ok(text) => {
                let hash =
                    ValueHash::from_hex(text.trim()).map_err(|e| StoreError::CorruptRef {
                        name: name.to_owned(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(hash))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        validate_ref_name(name)?;
        let path = self.ref_path(name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_dirs(&path).await;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        validate_ref_prefix(prefix)?;
        let mut names = Vec::new();
        let mut stack = vec![self.refs_dir.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                    continue;
                }
                let rel = path
                    .strip_prefix(&self.refs_dir)
                    .expect("walk stays under the refs root");
                let name = rel
                    .to_str()
                    .context("ref file name is not valid UTF-8")?
                    .replace(std::path::MAIN_SEPARATOR, "/");
                if name.starts_with(prefix) {
                    names.push(name);
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sluice_store_core::hash_value;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();

        let value = json!({"name": "users", "columns": ["id", "name"]});
        let hash = store.put(&value).await.unwrap();
        assert_eq!(store.get(&hash).await.unwrap().unwrap(), value);
    }

    #[tokio::test]
    async fn test_object_layout_fan_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();

        let hash = store.put(&json!({"val": 1})).await.unwrap();
        let hex = hash.to_hex();
        let path = dir.path().join("objects").join(&hex[..2]).join(&hex[2..]);
        assert!(path.is_file());
        // File bytes are the canonical serialization.
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(canonical_bytes(&json!({"val": 1})).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_put_idempotent_and_no_stale_staging() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();

        let value = json!([1, 2, 3]);
        let h1 = store.put(&value).await.unwrap();
        let h2 = store.put(&value).await.unwrap();
        assert_eq!(h1, h2);

        // Exactly one object file, no leftover .tmp files.
        let mut files = Vec::new();
        let mut stack = vec![dir.path().join("objects")];
        while let Some(d) = stack.pop() {
            for entry in std::fs::read_dir(d).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        assert_eq!(files.len(), 1);
        assert!(files[0].extension().is_none());
    }

    #[tokio::test]
    async fn test_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let absent = hash_value(&json!("never stored")).unwrap();
        assert!(store.get(&absent).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_preserves_objects() {
        let dir = tempfile::tempdir().unwrap();
        let hash = {
            let store = FsStore::open(dir.path()).unwrap();
            store.put(&json!({"persistent": true})).await.unwrap()
        };
        let store = FsStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get(&hash).await.unwrap().unwrap(),
            json!({"persistent": true})
        );
    }

    #[tokio::test]
    async fn test_ref_set_get_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let refs = FsRefs::open(dir.path()).unwrap();

        let h1 = hash_value(&json!(1)).unwrap();
        let h2 = hash_value(&json!(2)).unwrap();

        refs.set("db/tables/users/schema", h1).await.unwrap();
        assert_eq!(refs.get("db/tables/users/schema").await.unwrap(), Some(h1));

        refs.set("db/tables/users/schema", h2).await.unwrap();
        assert_eq!(refs.get("db/tables/users/schema").await.unwrap(), Some(h2));

        // One file per ref, hash hex as contents.
        let path = dir.path().join("refs/db/tables/users/schema");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), h2.to_hex());
    }

    #[tokio::test]
    async fn test_delete_prunes_empty_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let refs = FsRefs::open(dir.path()).unwrap();
        let hash = hash_value(&json!(1)).unwrap();

        refs.set("a/b/c/leaf", hash).await.unwrap();
        refs.set("a/other", hash).await.unwrap();

        refs.delete("a/b/c/leaf").await.unwrap();
        // b/c and b are emptied and must be gone; a still holds `other`.
        assert!(!dir.path().join("refs/a/b").exists());
        assert!(dir.path().join("refs/a").is_dir());
        assert_eq!(refs.get("a/other").await.unwrap(), Some(hash));

        // refs root itself survives deleting the last ref.
        refs.delete("a/other").await.unwrap();
        assert!(dir.path().join("refs").is_dir());
        assert!(!dir.path().join("refs/a").exists());
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let refs = FsRefs::open(dir.path()).unwrap();
        refs.delete("never/bound").await.unwrap();
        refs.delete("never/bound").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_prefix_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let refs = FsRefs::open(dir.path()).unwrap();
        let hash = hash_value(&json!(1)).unwrap();

        for name in [
            "db/tables/users/rows/2",
            "db/tables/users/rows/1",
            "db/tables/users/rows/3",
            "db/tables/users/schema",
            "db/meta",
        ] {
            refs.set(name, hash).await.unwrap();
        }

        let rows = refs.list("db/tables/users/rows/").await.unwrap();
        assert_eq!(
            rows,
            vec![
                "db/tables/users/rows/1",
                "db/tables/users/rows/2",
                "db/tables/users/rows/3",
            ]
        );

        let all = refs.list("").await.unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_escaping_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let refs = FsRefs::open(dir.path()).unwrap();
        let hash = hash_value(&json!(1)).unwrap();
        assert!(refs.set("../outside", hash).await.is_err());
        assert!(refs.get("a/../../outside").await.is_err());
        assert!(refs.list("..").await.is_err());
    }
}
