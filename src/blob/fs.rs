//! Filesystem-backed blob store
//!
//! Layout under the root directory:
//!
//! ```text
//! objects/{key}        object bytes
//! meta/{key}.meta      JSON sidecar: content type and attributes
//! tmp/                 staging area for atomic writes
//! ```
//!
//! Writes go to `tmp/` first and are renamed into place, so a reader never
//! observes a torn object.

use super::{validate_key, BlobMetadata, BlobObject, BlobStore, PutOptions};
use crate::error::{Result, VaultError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

fn storage_error(op: &str, key: &str, err: std::io::Error) -> VaultError {
    if err.kind() == ErrorKind::NotFound {
        VaultError::NotFound(format!("blob {}", key))
    } else {
        VaultError::StorageUnavailable(format!("{} {}: {}", op, key, err))
    }
}

/// Blob store rooted at a local directory
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
    staging_seq: AtomicU64,
}

impl FsBlobStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in ["objects", "meta", "tmp"] {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }
        info!("Opened filesystem blob store at {:?}", root);
        Ok(FsBlobStore {
            root,
            staging_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .fold(self.root.join("objects"), |path, seg| path.join(seg))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        let mut path = key
            .split('/')
            .fold(self.root.join("meta"), |path, seg| path.join(seg))
            .into_os_string();
        path.push(".meta");
        PathBuf::from(path)
    }

    fn staging_path(&self) -> PathBuf {
        let seq = self.staging_seq.fetch_add(1, Ordering::SeqCst);
        self.root.join("tmp").join(format!(
            "{}-{}-{}.part",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            seq
        ))
    }

    async fn write_atomic(&self, target: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = self.staging_path();
        tokio::fs::write(&staging, data).await?;
        if let Err(e) = tokio::fs::rename(&staging, target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }
        Ok(())
    }

    async fn object_info(&self, key: &str, path: &Path) -> Result<BlobObject> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| storage_error("stat", key, e))?;
        let modified_at = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(BlobObject {
            key: key.to_string(),
            size: meta.len(),
            modified_at,
        })
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, options: PutOptions) -> Result<BlobObject> {
        validate_key(key)?;
        let path = self.object_path(key);

        let sidecar = serde_json::to_vec(&Sidecar {
            content_type: options.content_type,
            attributes: options.attributes,
        })?;

        // Sidecar first: an object is never visible without its metadata.
        self.write_atomic(&self.meta_path(key), &sidecar)
            .await
            .map_err(|e| storage_error("put", key, e))?;
        self.write_atomic(&path, &bytes)
            .await
            .map_err(|e| storage_error("put", key, e))?;

        debug!("Wrote {} bytes to {}", bytes.len(), key);
        self.object_info(key, &path).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        validate_key(key)?;
        let data = tokio::fs::read(self.object_path(key))
            .await
            .map_err(|e| storage_error("get", key, e))?;
        Ok(Bytes::from(data))
    }

    async fn head(&self, key: &str) -> Result<BlobMetadata> {
        validate_key(key)?;
        let object = self.object_info(key, &self.object_path(key)).await?;

        let sidecar = match tokio::fs::read(self.meta_path(key)).await {
            Ok(raw) => serde_json::from_slice::<Sidecar>(&raw)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Sidecar {
                content_type: super::JSON_CONTENT_TYPE.to_string(),
                attributes: BTreeMap::new(),
            },
            Err(e) => return Err(storage_error("head", key, e)),
        };

        Ok(BlobMetadata {
            object,
            content_type: sidecar.content_type,
            attributes: sidecar.attributes,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        for path in [self.object_path(key), self.meta_path(key)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(storage_error("delete", key, e)),
            }
        }
        debug!("Deleted {}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        match tokio::fs::metadata(self.object_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error("exists", key, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>> {
        // Start the walk at the deepest directory named by the prefix.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = dir_part
            .split('/')
            .filter(|seg| !seg.is_empty())
            .fold(self.root.join("objects"), |path, seg| path.join(seg));

        let mut pending = vec![(start, dir_part.to_string())];
        let mut found = Vec::new();

        while let Some((dir, key_base)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(storage_error("list", prefix, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| storage_error("list", prefix, e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = if key_base.is_empty() {
                    name
                } else {
                    format!("{}/{}", key_base, name)
                };

                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| storage_error("list", &key, e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else if key.starts_with(prefix) {
                    found.push(self.object_info(&key, &entry.path()).await?);
                }
            }
        }

        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }
}
