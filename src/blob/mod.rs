//! Blob store adapter
//!
//! Durable key/value object storage with path-style keys. Backs both the
//! mutable `latest.json` pointer and the immutable per-version archives.
//!
//! The store offers no multi-key transaction. Every operation is idempotent at
//! the key level: `put` overwrites and `delete` of a missing key succeeds.
//!
//! Implementations:
//! - [`MemoryBlobStore`]: in-process map with fault injection for tests
//! - [`FsBlobStore`]: one file per key under a local directory
//! - [`TimeoutBlobStore`]: bounds every call of an inner store with a deadline

mod fs;
mod memory;
mod timeout;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use timeout::TimeoutBlobStore;

use crate::error::{Result, VaultError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Content type used when none is declared
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Attribute names written alongside every screen blob
pub mod attr {
    pub const VERSION: &str = "version";
    pub const SCREEN: &str = "screen";
    pub const APP: &str = "app";
    pub const UPLOADED_AT: &str = "uploaded_at";
    pub const ETAG: &str = "etag";
}

/// One entry of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobObject {
    pub key: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// Object metadata returned by `head`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub object: BlobObject,
    pub content_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl BlobMetadata {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Options attached to a `put`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: String,
    pub attributes: BTreeMap<String, String>,
}

impl Default for PutOptions {
    fn default() -> Self {
        PutOptions {
            content_type: JSON_CONTENT_TYPE.to_string(),
            attributes: BTreeMap::new(),
        }
    }
}

impl PutOptions {
    pub fn new(content_type: impl Into<String>) -> Self {
        PutOptions {
            content_type: content_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Durable object storage with path-based keys
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` at `key`, overwriting any existing object
    async fn put(&self, key: &str, bytes: Bytes, options: PutOptions) -> Result<BlobObject>;

    /// Read the object at `key`; `NotFound` if absent
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Read object metadata without the body; `NotFound` if absent
    async fn head(&self, key: &str) -> Result<BlobMetadata>;

    /// Remove the object at `key`; succeeds if already absent
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// All objects whose key starts with `prefix`, sorted by key
    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>>;
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn put(&self, key: &str, bytes: Bytes, options: PutOptions) -> Result<BlobObject> {
        (**self).put(key, bytes, options).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        (**self).get(key).await
    }

    async fn head(&self, key: &str) -> Result<BlobMetadata> {
        (**self).head(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>> {
        (**self).list(prefix).await
    }
}

/// Compute the etag (hex SHA-256) of a payload
pub fn compute_etag(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Validate a blob key
///
/// Keys are relative, `/`-separated, and may not contain empty, `.` or `..`
/// segments or backslashes.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(VaultError::InvalidKey("key cannot be empty".to_string()));
    }

    if key.len() > 1024 {
        return Err(VaultError::InvalidKey(format!(
            "key too long: {} bytes (max 1024)",
            key.len()
        )));
    }

    if key.contains('\\')
        || key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(VaultError::InvalidKey(key.to_string()));
    }

    Ok(())
}
