//! Version manager: the per-screen state machine
//!
//! A screen is either absent or active. Every accepted upload or rollback
//! moves it forward by one version through the sequence in
//! [`crate::transition`]; deletion removes it outright.
//!
//! ```text
//!   NoScreen --create/adopt_legacy--> Active --upload/rollback--> Active
//!                                      |
//!                                      +--delete--> NoScreen
//! ```

use crate::blob::{compute_etag, BlobStore, JSON_CONTENT_TYPE};
use crate::error::{Result, VaultError};
use crate::layout::{ContentSource, KeyLayout, RecordLayout, ScreenKeys};
use crate::metadata::{MetadataStore, ScreenPage, ScreenQuery};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::screen::{ScreenDetails, ScreenDetailsPatch, ScreenRecord, VersionInfo};
use crate::transition::{self, ArchiveOutcome, Transition};
use crate::validation::{AppId, ScreenName};
use crate::version::ScreenVersion;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Content of one screen version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenContent {
    pub version: ScreenVersion,
    pub data: Bytes,
    pub content_type: String,
}

/// Lightweight version check for clients polling for updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCheck {
    pub version: ScreenVersion,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of deleting a screen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Blob keys removed (or already absent)
    pub deleted: Vec<String>,

    /// Blob keys whose deletion failed; left behind as garbage
    pub failed: Vec<String>,
}

impl DeleteReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Orchestrates versioned screens across a blob store and a metadata store
#[derive(Debug)]
pub struct VersionManager<B, M> {
    blobs: B,
    metadata: M,
    layout: KeyLayout,
    content_type: String,
}

impl<B: BlobStore, M: MetadataStore> VersionManager<B, M> {
    /// Create a manager with the default `apps/` key layout
    pub fn new(blobs: B, metadata: M) -> Self {
        VersionManager {
            blobs,
            metadata,
            layout: KeyLayout::default(),
            content_type: JSON_CONTENT_TYPE.to_string(),
        }
    }

    pub fn with_layout(mut self, layout: KeyLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Content type declared for stored payloads
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn keys(&self, app: &AppId, name: &ScreenName) -> ScreenKeys {
        self.layout.screen(app, name)
    }

    async fn load(&self, app: &AppId, name: &ScreenName) -> Result<ScreenRecord> {
        self.metadata
            .get(app, name)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("screen {}/{}", app, name)))
    }

    /// Create a screen at its initial version
    ///
    /// Writes the content to both the versioned and the latest key, then
    /// inserts the metadata record with an empty ledger.
    pub async fn create(
        &self,
        app: &AppId,
        name: &ScreenName,
        version: &ScreenVersion,
        content: Bytes,
        details: ScreenDetails,
    ) -> Result<ScreenRecord> {
        if self.metadata.get(app, name).await?.is_some() {
            return Err(VaultError::AlreadyExists(format!("screen {}/{}", app, name)));
        }

        let keys = self.keys(app, name);
        let written = transition::write_dual(
            &self.blobs,
            &keys,
            app,
            name,
            version,
            content,
            &self.content_type,
        )
        .await?;

        let record = ScreenRecord {
            app: app.clone(),
            name: name.clone(),
            details,
            current_version: version.clone(),
            current_blob_key: keys.latest(),
            current_size: written.size,
            current_etag: Some(written.etag),
            content_type: written.content_type,
            ledger: Default::default(),
            layout: RecordLayout::Versioned,
            is_active: true,
            access_count: 0,
            last_accessed: None,
            created_at: written.written_at,
            updated_at: written.written_at,
            revision: 0,
        };

        let record = self.metadata.insert(record).await?;
        info!("Created screen {}/{} at v{}", app, name, version);
        Ok(record)
    }

    /// Register a screen whose content predates versioning
    ///
    /// The content stays at the legacy flat key and is treated as an implicit
    /// `version` with an empty ledger. The first upload archives it.
    pub async fn adopt_legacy(
        &self,
        app: &AppId,
        name: &ScreenName,
        version: &ScreenVersion,
        details: ScreenDetails,
    ) -> Result<ScreenRecord> {
        if self.metadata.get(app, name).await?.is_some() {
            return Err(VaultError::AlreadyExists(format!("screen {}/{}", app, name)));
        }

        let keys = self.keys(app, name);
        let head = self.blobs.head(keys.legacy()).await?;
        let now = Utc::now();

        let record = ScreenRecord {
            app: app.clone(),
            name: name.clone(),
            details,
            current_version: version.clone(),
            current_blob_key: keys.legacy().to_string(),
            current_size: head.object.size,
            current_etag: head.attribute(crate::blob::attr::ETAG).map(str::to_string),
            content_type: head.content_type,
            ledger: Default::default(),
            layout: RecordLayout::Legacy,
            is_active: true,
            access_count: 0,
            last_accessed: None,
            created_at: head.object.modified_at,
            updated_at: now,
            revision: 0,
        };

        let record = self.metadata.insert(record).await?;
        info!(
            "Adopted legacy screen {}/{} as implicit v{}",
            app, name, version
        );
        Ok(record)
    }

    /// Upload a new version
    ///
    /// Fails with `VersionNotAdvancing` unless `version` is strictly greater
    /// than the current version. A blob failure aborts before the metadata
    /// commit, leaving the current version unchanged.
    pub async fn upload(
        &self,
        app: &AppId,
        name: &ScreenName,
        version: &ScreenVersion,
        content: Bytes,
    ) -> Result<ScreenRecord> {
        let record = self.load(app, name).await?;
        self.advance(&record, version, content).await
    }

    async fn advance(
        &self,
        observed: &ScreenRecord,
        version: &ScreenVersion,
        content: Bytes,
    ) -> Result<ScreenRecord> {
        let current = &observed.current_version;
        if !version.advances(current) {
            return Err(VaultError::VersionNotAdvancing {
                submitted: version.to_string(),
                current: current.to_string(),
            });
        }

        let keys = self.keys(&observed.app, &observed.name);
        let step = Transition::new(&keys, observed);

        let archived = step.archive_current(&self.blobs).await?;
        if let Some(from) = &archived.healed_from {
            warn!(
                "Re-archived {}/{} v{} from {}",
                observed.app, observed.name, current, from
            );
        }

        let written = transition::write_dual(
            &self.blobs,
            &keys,
            &observed.app,
            &observed.name,
            version,
            content,
            &self.content_type,
        )
        .await?;

        let next = step.next_record(archived.entry, written)?;
        let committed = match self.metadata.commit(next, observed.revision).await {
            Ok(committed) => committed,
            Err(e) => {
                warn!(
                    "Commit of {}/{} v{} failed ({}), restoring latest",
                    observed.app, observed.name, version, e
                );
                self.restore_latest(&observed.app, &observed.name, &keys).await;
                return Err(e);
            }
        };

        info!(
            "Screen {}/{} advanced v{} -> v{} (ledger {})",
            observed.app,
            observed.name,
            current,
            version,
            committed.ledger.len()
        );
        Ok(committed)
    }

    /// Put the committed current version back at the latest key after a
    /// transition overwrote it and then lost its commit
    ///
    /// Best-effort: reads check the recorded etag regardless, and
    /// reconciliation replays a latest key that is still stale.
    async fn restore_latest(&self, app: &AppId, name: &ScreenName, keys: &ScreenKeys) {
        let record = match self.metadata.get(app, name).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                warn!("Cannot restore latest of {}/{}: {}", app, name, e);
                return;
            }
        };

        if transition::effective_layout(&record, keys) == RecordLayout::Legacy {
            // Legacy records never read the latest key.
            if let Err(e) = self.blobs.delete(&keys.latest()).await {
                warn!("Cannot remove latest of legacy {}/{}: {}", app, name, e);
            }
            return;
        }

        let source = keys.versioned(&record.current_version);
        let data = match self.blobs.get(&source).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Cannot restore latest of {}/{} from {}: {}", app, name, source, e);
                return;
            }
        };

        let etag = compute_etag(&data);
        if record.current_etag.as_deref().is_some_and(|want| want != etag) {
            warn!("{} does not hold the committed content of {}/{}", source, app, name);
            return;
        }

        let options = transition::blob_options(
            app,
            name,
            &record.current_version,
            &record.content_type,
            &etag,
            Utc::now(),
        );
        match self.blobs.put(&keys.latest(), data, options).await {
            Ok(_) => debug!("Restored latest of {}/{} to v{}", app, name, record.current_version),
            Err(e) => warn!("Cannot restore latest of {}/{}: {}", app, name, e),
        }
    }

    /// Make sure the current version is archived at its versioned key
    ///
    /// Idempotent; the record is not modified.
    pub async fn ensure_archived(&self, app: &AppId, name: &ScreenName) -> Result<ArchiveOutcome> {
        let record = self.load(app, name).await?;
        let keys = self.keys(app, name);
        Transition::new(&keys, &record)
            .archive_current(&self.blobs)
            .await
    }

    /// Current content, skipping any source that no longer matches the
    /// recorded etag
    async fn read_current(&self, record: &ScreenRecord, keys: &ScreenKeys) -> Result<Bytes> {
        let layout = transition::effective_layout(record, keys);
        let sources = keys.current_sources(layout, &record.current_version);

        let what = format!("{}/{} v{}", record.app, record.name, record.current_version);
        let expected = record.current_etag.as_deref();
        let (data, _) = transition::read_verified(&self.blobs, &sources, expected, &what).await?;
        Ok(data)
    }

    async fn read_archived(
        &self,
        record: &ScreenRecord,
        keys: &ScreenKeys,
        version: &ScreenVersion,
    ) -> Result<Bytes> {
        let entry = record.ledger.find(version).ok_or_else(|| {
            VaultError::NotFound(format!(
                "version {} of screen {}/{}",
                version, record.app, record.name
            ))
        })?;

        let mut sources = vec![ContentSource::Versioned(entry.blob_key.clone())];
        for source in keys.archived_sources(version, entry.origin) {
            if !sources.iter().any(|s| s.key() == source.key()) {
                sources.push(source);
            }
        }

        let what = format!("{}/{} v{}", record.app, record.name, version);
        let (data, source) = transition::read_first(&self.blobs, &sources, &what).await?;
        if source.is_legacy() {
            debug!("Served {} from legacy key", what);
        }
        Ok(data)
    }

    /// Read a specific version
    ///
    /// The current version is served from the latest key, or from its
    /// versioned key when latest is stale. Archived versions come from their
    /// versioned key; only a version archived from a legacy record falls back
    /// to the flat key.
    pub async fn get_version(
        &self,
        app: &AppId,
        name: &ScreenName,
        version: &ScreenVersion,
    ) -> Result<ScreenContent> {
        let record = self.load(app, name).await?;
        let keys = self.keys(app, name);

        let data = if *version == record.current_version {
            self.read_current(&record, &keys).await
        } else {
            self.read_archived(&record, &keys, version).await
        }
        .map_err(|e| {
            if let VaultError::Corruption(detail) = &e {
                error!("Corrupt screen {}/{}: {}", app, name, detail);
            }
            e.surface_corruption()
        })?;

        Ok(ScreenContent {
            version: version.clone(),
            data,
            content_type: record.content_type,
        })
    }

    /// Restore an archived version by recording it as a new version
    ///
    /// The new version is the current one with its patch component
    /// incremented; the target's archive is only read.
    pub async fn rollback(
        &self,
        app: &AppId,
        name: &ScreenName,
        target: &ScreenVersion,
    ) -> Result<ScreenRecord> {
        let record = self.load(app, name).await?;

        if *target == record.current_version {
            return Err(VaultError::InvalidRollback(format!(
                "v{} is already the current version of {}/{}",
                target, app, name
            )));
        }
        if !record.ledger.contains(target) {
            return Err(VaultError::InvalidRollback(format!(
                "v{} is not in the history of {}/{}",
                target, app, name
            )));
        }

        let keys = self.keys(app, name);
        let content = self
            .read_archived(&record, &keys, target)
            .await
            .map_err(VaultError::surface_corruption)?;

        let next_version = record.current_version.next_patch()?;
        info!(
            "Rolling back {}/{} to content of v{} as v{}",
            app, name, target, next_version
        );
        self.advance(&record, &next_version, content).await
    }

    /// Delete a screen and every blob it owns
    ///
    /// Blob failures are logged and reported, never fatal: the metadata record
    /// is removed regardless.
    pub async fn delete(&self, app: &AppId, name: &ScreenName) -> Result<DeleteReport> {
        let record = self.load(app, name).await?;
        let keys = self.keys(app, name);

        let mut targets: Vec<String> = match self.blobs.list(keys.prefix()).await {
            Ok(objects) => objects.into_iter().map(|o| o.key).collect(),
            Err(e) => {
                warn!(
                    "Listing {} failed ({}), deleting known keys only",
                    keys.prefix(),
                    e
                );
                let mut known = vec![keys.latest(), keys.versioned(&record.current_version)];
                known.extend(record.ledger.iter().map(|entry| entry.blob_key.clone()));
                known
            }
        };
        targets.push(keys.legacy().to_string());
        targets.sort();
        targets.dedup();

        let results = join_all(targets.iter().map(|key| self.blobs.delete(key))).await;

        let mut report = DeleteReport::default();
        for (key, result) in targets.into_iter().zip(results) {
            match result {
                Ok(()) => report.deleted.push(key),
                Err(e) => {
                    warn!("Failed to delete blob {}: {}", key, e);
                    report.failed.push(key);
                }
            }
        }

        self.metadata.remove(app, name).await?;

        info!(
            "Deleted screen {}/{} ({} blobs removed, {} failed)",
            app,
            name,
            report.deleted.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Ledger entries plus the current version, newest first
    pub async fn list_versions(&self, app: &AppId, name: &ScreenName) -> Result<Vec<VersionInfo>> {
        let record = self.load(app, name).await?;

        let mut versions: Vec<VersionInfo> = record
            .ledger
            .iter()
            .map(|entry| VersionInfo {
                version: entry.version.clone(),
                blob_key: entry.blob_key.clone(),
                size: entry.size,
                is_current: false,
                archived_at: Some(entry.archived_at),
            })
            .collect();
        versions.push(VersionInfo {
            version: record.current_version.clone(),
            blob_key: record.current_blob_key.clone(),
            size: record.current_size,
            is_current: true,
            archived_at: None,
        });

        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    /// Screens of one application, filtered and paginated
    pub async fn list_screens(&self, app: &AppId, query: &ScreenQuery) -> Result<ScreenPage> {
        let records = self.metadata.list(Some(app)).await?;
        Ok(query.apply(records))
    }

    /// Full metadata record of a screen
    pub async fn describe(&self, app: &AppId, name: &ScreenName) -> Result<ScreenRecord> {
        self.load(app, name).await
    }

    /// Edit descriptive fields and the activation flag
    pub async fn update_details(
        &self,
        app: &AppId,
        name: &ScreenName,
        patch: ScreenDetailsPatch,
    ) -> Result<ScreenRecord> {
        let record = self.load(app, name).await?;
        if patch.is_empty() {
            return Ok(record);
        }

        let revision = record.revision;
        let mut next = record;
        next.apply_patch(patch);
        next.updated_at = Utc::now();

        let committed = self.metadata.commit(next, revision).await?;
        debug!("Updated details of {}/{}", app, name);
        Ok(committed)
    }

    fn require_active(record: &ScreenRecord) -> Result<()> {
        if record.is_active {
            Ok(())
        } else {
            Err(VaultError::Inactive(format!(
                "screen {}/{}",
                record.app, record.name
            )))
        }
    }

    /// Serve the current content to a client and count the access
    ///
    /// The access counter is best-effort: a conflicting commit is retried once,
    /// then dropped.
    pub async fn fetch(&self, app: &AppId, name: &ScreenName) -> Result<ScreenContent> {
        let record = self.load(app, name).await?;
        Self::require_active(&record)?;

        let keys = self.keys(app, name);
        let data = self
            .read_current(&record, &keys)
            .await
            .map_err(VaultError::surface_corruption)?;

        let content = ScreenContent {
            version: record.current_version.clone(),
            data,
            content_type: record.content_type.clone(),
        };

        self.track_access(record).await;
        Ok(content)
    }

    async fn track_access(&self, mut record: ScreenRecord) {
        for attempt in 0..2 {
            let revision = record.revision;
            record.track_access(Utc::now());
            match self.metadata.commit(record.clone(), revision).await {
                Ok(_) => return,
                Err(VaultError::ConcurrentModification { .. }) if attempt == 0 => {
                    match self.metadata.get(&record.app, &record.name).await {
                        Ok(Some(fresh)) => record = fresh,
                        _ => return,
                    }
                }
                Err(e) => {
                    warn!(
                        "Dropped access count for {}/{}: {}",
                        record.app, record.name, e
                    );
                    return;
                }
            }
        }
    }

    /// Check every screen (or one application's) against the blob store
    pub async fn reconcile(&self, app: Option<&AppId>) -> Result<ReconcileReport> {
        Reconciler::new(&self.blobs, &self.metadata, &self.layout)
            .run(app)
            .await
    }

    /// Current version of an active screen without reading its content
    pub async fn current_version(&self, app: &AppId, name: &ScreenName) -> Result<VersionCheck> {
        let record = self.load(app, name).await?;
        Self::require_active(&record)?;
        Ok(VersionCheck {
            version: record.current_version,
            updated_at: record.updated_at,
        })
    }
}
