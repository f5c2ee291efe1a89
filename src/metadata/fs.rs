//! Filesystem-backed metadata store
//!
//! One pretty-printed JSON document per screen at
//! `{root}/{app namespace}/{screen}.json`. Writers are serialized within the
//! process so the revision check and the rename happen as one step.

use super::MetadataStore;
use crate::error::{Result, VaultError};
use crate::screen::ScreenRecord;
use crate::validation::{AppId, ScreenName};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

fn storage_error(op: &str, path: &Path, err: std::io::Error) -> VaultError {
    VaultError::StorageUnavailable(format!("metadata {} {:?}: {}", op, path, err))
}

/// Metadata store rooted at a local directory
#[derive(Debug)]
pub struct FsMetadataStore {
    root: PathBuf,
    write_lock: Mutex<()>,
    staging_seq: AtomicU64,
}

impl FsMetadataStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join(".tmp")).await?;
        info!("Opened filesystem metadata store at {:?}", root);
        Ok(FsMetadataStore {
            root,
            write_lock: Mutex::new(()),
            staging_seq: AtomicU64::new(0),
        })
    }

    fn record_path(&self, app: &AppId, name: &ScreenName) -> PathBuf {
        self.root
            .join(app.key_segment())
            .join(format!("{}.json", name))
    }

    /// Unique per write, independent of the record's names
    fn staging_path(&self) -> PathBuf {
        let seq = self.staging_seq.fetch_add(1, Ordering::SeqCst);
        self.root
            .join(".tmp")
            .join(format!("{}-{}.json", std::process::id(), seq))
    }

    async fn read_record(&self, path: &Path) -> Result<Option<ScreenRecord>> {
        match tokio::fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", path, e)),
        }
    }

    async fn write_record(&self, path: &Path, record: &ScreenRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("mkdir", parent, e))?;
        }

        let staging = self.staging_path();
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| storage_error("write", &staging, e))?;
        tokio::fs::rename(&staging, path)
            .await
            .map_err(|e| storage_error("rename", path, e))?;

        debug!("Wrote metadata record {:?} (revision {})", path, record.revision);
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for FsMetadataStore {
    async fn get(&self, app: &AppId, name: &ScreenName) -> Result<Option<ScreenRecord>> {
        self.read_record(&self.record_path(app, name)).await
    }

    async fn insert(&self, mut record: ScreenRecord) -> Result<ScreenRecord> {
        let _guard = self.write_lock.lock().await;
        let path = self.record_path(&record.app, &record.name);

        if self.read_record(&path).await?.is_some() {
            return Err(VaultError::AlreadyExists(format!(
                "screen {}/{}",
                record.app, record.name
            )));
        }

        record.revision = 1;
        self.write_record(&path, &record).await?;
        Ok(record)
    }

    async fn commit(&self, mut record: ScreenRecord, expected_revision: u64) -> Result<ScreenRecord> {
        let _guard = self.write_lock.lock().await;
        let path = self.record_path(&record.app, &record.name);

        let stored = self.read_record(&path).await?.ok_or_else(|| {
            VaultError::NotFound(format!("screen {}/{}", record.app, record.name))
        })?;
        if stored.revision != expected_revision {
            return Err(VaultError::ConcurrentModification {
                expected: expected_revision,
                found: stored.revision,
            });
        }

        record.revision = expected_revision + 1;
        self.write_record(&path, &record).await?;
        Ok(record)
    }

    async fn remove(&self, app: &AppId, name: &ScreenName) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.record_path(app, name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error("remove", &path, e)),
        }
    }

    async fn list(&self, app: Option<&AppId>) -> Result<Vec<ScreenRecord>> {
        let dirs = match app {
            Some(app) => vec![self.root.join(app.key_segment())],
            None => {
                let mut dirs = Vec::new();
                let mut entries = tokio::fs::read_dir(&self.root)
                    .await
                    .map_err(|e| storage_error("list", &self.root, e))?;
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| storage_error("list", &self.root, e))?
                {
                    let hidden = entry.file_name().to_string_lossy().starts_with('.');
                    if !hidden && entry.path().is_dir() {
                        dirs.push(entry.path());
                    }
                }
                dirs
            }
        };

        let mut records = Vec::new();
        for dir in dirs {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(storage_error("list", &dir, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| storage_error("list", &dir, e))?
            {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match self.read_record(&path).await {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(VaultError::Serialization(e)) => {
                        warn!("Skipping unreadable metadata record {:?}: {}", path, e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        records.sort_by(|a, b| (&a.app, &a.name).cmp(&(&b.app, &b.name)));
        Ok(records)
    }
}
