//! Startup reconciliation of metadata records against blob contents
//!
//! Blob writes and metadata commits are not atomic together, so a crash or
//! timeout can leave a latest pointer that lags behind its record, or a
//! versioned blob nothing references. The reconciler repairs what can be
//! rebuilt from bytes already in the store and reports the rest. It never
//! modifies a metadata record.

use crate::blob::{attr, compute_etag, BlobStore};
use crate::error::{Result, VaultError};
use crate::layout::{ContentSource, KeyLayout, RecordLayout, ScreenKeys};
use crate::ledger::LedgerEntry;
use crate::metadata::MetadataStore;
use crate::screen::ScreenRecord;
use crate::transition::{self, blob_options};
use crate::validation::{AppId, ScreenName};
use crate::version::ScreenVersion;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Something the reconciler noticed about one screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// Ledger entry missing at its versioned key, copied back from `from`
    ReArchived { version: ScreenVersion, from: String },

    /// Ledger entry unreachable through every known key
    CorruptEntry { version: ScreenVersion, detail: String },

    /// Latest pointer was missing or stale and was rewritten from `from`
    LatestReplayed { from: String },

    /// Current content cannot be recovered
    CurrentUnreachable { detail: String },

    /// Versioned blob neither current nor in the ledger; left in place
    Orphan { key: String },
}

impl Finding {
    pub fn is_repair(&self) -> bool {
        matches!(
            self,
            Finding::ReArchived { .. } | Finding::LatestReplayed { .. }
        )
    }

    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Finding::CorruptEntry { .. } | Finding::CurrentUnreachable { .. }
        )
    }
}

/// Findings for one screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenFindings {
    pub app: String,
    pub name: ScreenName,
    pub findings: Vec<Finding>,
}

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub screens_checked: usize,
    pub entries_checked: usize,
    pub repaired: usize,
    pub corrupt: usize,
    pub orphans: usize,

    /// Only screens with at least one finding
    pub screens: Vec<ScreenFindings>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.screens.is_empty()
    }

    fn absorb(&mut self, record: &ScreenRecord, findings: Vec<Finding>) {
        self.screens_checked += 1;
        self.entries_checked += record.ledger.len();
        if findings.is_empty() {
            return;
        }

        for finding in &findings {
            if finding.is_repair() {
                self.repaired += 1;
            } else if finding.is_corruption() {
                self.corrupt += 1;
            } else {
                self.orphans += 1;
            }
        }
        self.screens.push(ScreenFindings {
            app: record.app.to_string(),
            name: record.name.clone(),
            findings,
        });
    }
}

/// Walks metadata records and checks their blobs
pub struct Reconciler<'a, B: ?Sized, M: ?Sized> {
    blobs: &'a B,
    metadata: &'a M,
    layout: &'a KeyLayout,
}

impl<'a, B, M> Reconciler<'a, B, M>
where
    B: BlobStore + ?Sized,
    M: MetadataStore + ?Sized,
{
    pub fn new(blobs: &'a B, metadata: &'a M, layout: &'a KeyLayout) -> Self {
        Reconciler {
            blobs,
            metadata,
            layout,
        }
    }

    /// Check every screen, or only those of `app`
    pub async fn run(&self, app: Option<&AppId>) -> Result<ReconcileReport> {
        let records = self.metadata.list(app).await?;
        info!("Reconciling {} screen(s)", records.len());

        let mut report = ReconcileReport::default();
        for record in records {
            let findings = self.check_screen(&record).await?;
            report.absorb(&record, findings);
        }

        info!(
            "Reconciliation done: {} screens, {} repaired, {} corrupt, {} orphans",
            report.screens_checked, report.repaired, report.corrupt, report.orphans
        );
        Ok(report)
    }

    /// Findings for a single record
    pub async fn check_screen(&self, record: &ScreenRecord) -> Result<Vec<Finding>> {
        let keys = self.layout.screen(&record.app, &record.name);
        let mut findings = Vec::new();

        for entry in record.ledger.iter() {
            if self.blobs.exists(&entry.blob_key).await? {
                continue;
            }
            if let Some(finding) = self.restore_entry(record, &keys, entry).await? {
                findings.push(finding);
            }
        }

        match transition::effective_layout(record, &keys) {
            RecordLayout::Versioned => {
                if let Some(finding) = self.check_latest(record, &keys).await? {
                    findings.push(finding);
                }
            }
            RecordLayout::Legacy => {
                if !self.blobs.exists(keys.legacy()).await?
                    && !self.blobs.exists(&keys.versioned(&record.current_version)).await?
                {
                    let detail = format!("legacy content missing at {}", keys.legacy());
                    error!("Screen {}/{}: {}", record.app, record.name, detail);
                    findings.push(Finding::CurrentUnreachable { detail });
                }
            }
        }

        for object in self.blobs.list(keys.prefix()).await? {
            let Some(version) = keys.parse_versioned(&object.key) else {
                continue;
            };
            if version != record.current_version && !record.ledger.contains(&version) {
                debug!("Orphan blob {}", object.key);
                findings.push(Finding::Orphan { key: object.key });
            }
        }

        Ok(findings)
    }

    async fn restore_entry(
        &self,
        record: &ScreenRecord,
        keys: &ScreenKeys,
        entry: &LedgerEntry,
    ) -> Result<Option<Finding>> {
        let version = &entry.version;
        let target = entry.blob_key.as_str();
        let sources: Vec<ContentSource> = keys
            .archived_sources(version, entry.origin)
            .into_iter()
            .filter(|source| source.key() != target)
            .collect();
        let what = format!("{}/{} v{}", record.app, record.name, version);

        match transition::read_first(self.blobs, &sources, &what).await {
            Ok((data, source)) => {
                let etag = compute_etag(&data);
                let options = blob_options(
                    &record.app,
                    &record.name,
                    version,
                    &record.content_type,
                    &etag,
                    Utc::now(),
                );
                self.blobs.put(target, data, options).await?;
                warn!("Re-archived {} from {}", what, source.key());
                Ok(Some(Finding::ReArchived {
                    version: version.clone(),
                    from: source.key().to_string(),
                }))
            }
            Err(VaultError::Corruption(detail)) => {
                error!("Ledger entry {} is corrupt: {}", what, detail);
                Ok(Some(Finding::CorruptEntry {
                    version: version.clone(),
                    detail,
                }))
            }
            Err(e) => Err(e),
        }
    }

    async fn check_latest(&self, record: &ScreenRecord, keys: &ScreenKeys) -> Result<Option<Finding>> {
        let latest = keys.latest();
        let expected = record.current_etag.as_deref();

        match self.blobs.head(&latest).await {
            Ok(head) => {
                let fresh = match expected {
                    Some(etag) => head.attribute(attr::ETAG) == Some(etag),
                    None => true,
                };
                if fresh {
                    return Ok(None);
                }
                warn!(
                    "Latest pointer of {}/{} is stale (record at v{})",
                    record.app, record.name, record.current_version
                );
            }
            Err(VaultError::NotFound(_)) => {
                warn!("Latest pointer of {}/{} is missing", record.app, record.name);
            }
            Err(e) => return Err(e),
        }

        let sources = [ContentSource::Versioned(keys.versioned(&record.current_version))];
        let what = format!("{}/{} v{}", record.app, record.name, record.current_version);

        let recovered = match transition::read_verified(self.blobs, &sources, expected, &what).await {
            Ok(found) => Some(found),
            Err(VaultError::Corruption(_)) => None,
            Err(e) => return Err(e),
        };

        if let Some((data, source)) = recovered {
            let etag = compute_etag(&data);
            let options = blob_options(
                &record.app,
                &record.name,
                &record.current_version,
                &record.content_type,
                &etag,
                Utc::now(),
            );
            self.blobs.put(&latest, data, options).await?;
            info!("Replayed latest pointer of {} from {}", what, source.key());
            return Ok(Some(Finding::LatestReplayed {
                from: source.key().to_string(),
            }));
        }

        let detail = format!("no blob holds the recorded content of {}", what);
        error!("{}", detail);
        Ok(Some(Finding::CurrentUnreachable { detail }))
    }
}
