//! Deadline wrapper for blob stores

use super::{BlobMetadata, BlobObject, BlobStore, PutOptions};
use crate::error::{Result, VaultError};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default per-call deadline
pub const DEFAULT_BLOB_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounds every call of the inner store with a timeout
///
/// A call that exceeds the deadline fails with `StorageUnavailable`. The
/// inner operation may still complete in the background; all operations are
/// key-idempotent so a late write is harmless.
#[derive(Debug)]
pub struct TimeoutBlobStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: BlobStore> TimeoutBlobStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        TimeoutBlobStore { inner, timeout }
    }

    pub fn with_default_timeout(inner: S) -> Self {
        Self::new(inner, DEFAULT_BLOB_TIMEOUT)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(&self, op: &str, key: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Blob {} on {} timed out after {:?}", op, key, self.timeout);
                Err(VaultError::StorageUnavailable(format!(
                    "{} {} timed out after {:?}",
                    op, key, self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl<S: BlobStore> BlobStore for TimeoutBlobStore<S> {
    async fn put(&self, key: &str, bytes: Bytes, options: PutOptions) -> Result<BlobObject> {
        self.bounded("put", key, self.inner.put(key, bytes, options)).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.bounded("get", key, self.inner.get(key)).await
    }

    async fn head(&self, key: &str) -> Result<BlobMetadata> {
        self.bounded("head", key, self.inner.head(key)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.bounded("delete", key, self.inner.delete(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.bounded("exists", key, self.inner.exists(key)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>> {
        self.bounded("list", prefix, self.inner.list(prefix)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;

    #[tokio::test]
    async fn test_passes_through_when_fast() {
        let store = TimeoutBlobStore::new(MemoryBlobStore::new(), Duration::from_secs(1));
        store
            .put("k.json", Bytes::from_static(b"{}"), PutOptions::default())
            .await
            .unwrap();
        assert_eq!(store.get("k.json").await.unwrap(), Bytes::from_static(b"{}"));
        assert!(matches!(
            store.get("missing.json").await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let inner = MemoryBlobStore::new();
        inner.set_latency(Duration::from_millis(200));
        let store = TimeoutBlobStore::new(inner, Duration::from_millis(20));

        let err = store
            .put("k.json", Bytes::from_static(b"{}"), PutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::StorageUnavailable(_)));
        assert!(err.is_retryable());
        assert!(store.inner().is_empty());
    }
}
