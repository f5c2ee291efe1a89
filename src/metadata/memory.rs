//! In-process metadata store

use super::MetadataStore;
use crate::error::{Result, VaultError};
use crate::screen::ScreenRecord;
use crate::validation::{AppId, ScreenName};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

type Identity = (String, String);

fn identity(app: &AppId, name: &ScreenName) -> Identity {
    (app.key_segment().to_string(), name.as_str().to_string())
}

/// Metadata store held in a sorted map
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: RwLock<BTreeMap<Identity, ScreenRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, app: &AppId, name: &ScreenName) -> Result<Option<ScreenRecord>> {
        Ok(self.records.read().get(&identity(app, name)).cloned())
    }

    async fn insert(&self, mut record: ScreenRecord) -> Result<ScreenRecord> {
        let id = identity(&record.app, &record.name);
        let mut records = self.records.write();
        if records.contains_key(&id) {
            return Err(VaultError::AlreadyExists(format!(
                "screen {}/{}",
                record.app, record.name
            )));
        }
        record.revision = 1;
        records.insert(id, record.clone());
        Ok(record)
    }

    async fn commit(&self, mut record: ScreenRecord, expected_revision: u64) -> Result<ScreenRecord> {
        let id = identity(&record.app, &record.name);
        let mut records = self.records.write();
        let stored = records.get_mut(&id).ok_or_else(|| {
            VaultError::NotFound(format!("screen {}/{}", record.app, record.name))
        })?;

        if stored.revision != expected_revision {
            return Err(VaultError::ConcurrentModification {
                expected: expected_revision,
                found: stored.revision,
            });
        }

        record.revision = expected_revision + 1;
        *stored = record.clone();
        Ok(record)
    }

    async fn remove(&self, app: &AppId, name: &ScreenName) -> Result<bool> {
        Ok(self.records.write().remove(&identity(app, name)).is_some())
    }

    async fn list(&self, app: Option<&AppId>) -> Result<Vec<ScreenRecord>> {
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|((namespace, _), _)| app.map_or(true, |a| a.key_segment() == namespace))
            .map(|(_, record)| record.clone())
            .collect())
    }
}
