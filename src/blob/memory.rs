//! In-process blob store
//!
//! Keeps objects in a sorted map behind a `parking_lot` lock. Faults and
//! latency can be injected per key pattern so that partial-write sequences can
//! be exercised in tests.

use super::{validate_key, BlobMetadata, BlobObject, BlobStore, PutOptions};
use crate::error::{Result, VaultError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    content_type: String,
    attributes: BTreeMap<String, String>,
    modified_at: DateTime<Utc>,
}

impl StoredBlob {
    fn object(&self, key: &str) -> BlobObject {
        BlobObject {
            key: key.to_string(),
            size: self.data.len() as u64,
            modified_at: self.modified_at,
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    put: Vec<String>,
    get: Vec<String>,
    delete: Vec<String>,
    latency: Option<Duration>,
}

fn matches_any(patterns: &[String], key: &str) -> bool {
    patterns.iter().any(|p| key.contains(p.as_str()))
}

/// Blob store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, StoredBlob>>,
    faults: Mutex<Faults>,
    puts: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `put` whose key contains `pattern` fail with `StorageUnavailable`
    pub fn fail_puts_containing(&self, pattern: impl Into<String>) {
        self.faults.lock().put.push(pattern.into());
    }

    /// Make every `get` whose key contains `pattern` fail with `StorageUnavailable`
    pub fn fail_gets_containing(&self, pattern: impl Into<String>) {
        self.faults.lock().get.push(pattern.into());
    }

    /// Make every `delete` whose key contains `pattern` fail with `StorageUnavailable`
    pub fn fail_deletes_containing(&self, pattern: impl Into<String>) {
        self.faults.lock().delete.push(pattern.into());
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.faults.lock().latency = Some(latency);
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Number of successful `put` calls so far
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Every key currently stored, sorted
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    async fn before(&self, op: &str, key: &str) -> Result<()> {
        let (latency, failing) = {
            let faults = self.faults.lock();
            let patterns = match op {
                "put" => &faults.put,
                "get" => &faults.get,
                "delete" => &faults.delete,
                _ => return Ok(()),
            };
            (faults.latency, matches_any(patterns, key))
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if failing {
            debug!("Injected {} failure for {}", op, key);
            return Err(VaultError::StorageUnavailable(format!(
                "injected {} failure for {}",
                op, key
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, options: PutOptions) -> Result<BlobObject> {
        validate_key(key)?;
        self.before("put", key).await?;

        let stored = StoredBlob {
            data: bytes,
            content_type: options.content_type,
            attributes: options.attributes,
            modified_at: Utc::now(),
        };
        let object = stored.object(key);

        debug!("Storing {} bytes at {}", object.size, key);
        self.objects.write().insert(key.to_string(), stored);
        self.puts.fetch_add(1, Ordering::SeqCst);

        Ok(object)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        validate_key(key)?;
        self.before("get", key).await?;

        self.objects
            .read()
            .get(key)
            .map(|blob| blob.data.clone())
            .ok_or_else(|| VaultError::NotFound(format!("blob {}", key)))
    }

    async fn head(&self, key: &str) -> Result<BlobMetadata> {
        validate_key(key)?;
        self.before("head", key).await?;

        self.objects
            .read()
            .get(key)
            .map(|blob| BlobMetadata {
                object: blob.object(key),
                content_type: blob.content_type.clone(),
                attributes: blob.attributes.clone(),
            })
            .ok_or_else(|| VaultError::NotFound(format!("blob {}", key)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.before("delete", key).await?;

        if self.objects.write().remove(key).is_some() {
            debug!("Deleted {}", key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        self.before("exists", key).await?;

        Ok(self.objects.read().contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>> {
        self.before("list", prefix).await?;

        let objects = self.objects.read();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, blob)| blob.object(key))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let store = MemoryBlobStore::new();
        store
            .put("a/b.json", Bytes::from_static(b"one"), PutOptions::default())
            .await
            .unwrap();
        store
            .put("a/b.json", Bytes::from_static(b"two"), PutOptions::default())
            .await
            .unwrap();

        assert_eq!(store.get("a/b.json").await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.get("nope.json").await,
            Err(VaultError::NotFound(_))
        ));
        assert!(!store.exists("nope.json").await.unwrap());
        store.delete("nope.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_prefix_is_exact() {
        let store = MemoryBlobStore::new();
        for key in ["apps/x/home/latest.json", "apps/x/home2/latest.json", "apps/x/home.json"] {
            store
                .put(key, Bytes::from_static(b"{}"), PutOptions::default())
                .await
                .unwrap();
        }

        let listed = store.list("apps/x/home/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "apps/x/home/latest.json");
        assert_eq!(listed[0].size, 2);
    }

    #[tokio::test]
    async fn test_head_returns_attributes() {
        let store = MemoryBlobStore::new();
        let opts = PutOptions::new("application/json").with_attribute("version", "1.0.0");
        store.put("k.json", Bytes::from_static(b"{}"), opts).await.unwrap();

        let head = store.head("k.json").await.unwrap();
        assert_eq!(head.content_type, "application/json");
        assert_eq!(head.attribute("version"), Some("1.0.0"));
        assert_eq!(head.object.size, 2);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryBlobStore::new();
        store.fail_puts_containing("latest");

        let err = store
            .put("s/latest.json", Bytes::from_static(b"{}"), PutOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store.is_empty());

        store
            .put("s/v1.0.0.json", Bytes::from_static(b"{}"), PutOptions::default())
            .await
            .unwrap();

        store.clear_faults();
        store
            .put("s/latest.json", Bytes::from_static(b"{}"), PutOptions::default())
            .await
            .unwrap();
        assert_eq!(store.keys(), vec!["s/latest.json", "s/v1.0.0.json"]);
    }
}
