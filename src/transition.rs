//! The cross-store write sequence behind every version transition
//!
//! The blob store and the metadata store share no transaction, so a version
//! transition is an explicit sequence of idempotent steps:
//!
//! 1. **archive**: make sure the outgoing version exists at its versioned key,
//!    copying it from the latest or legacy key if it does not
//! 2. **dual write**: write the incoming content to its versioned key, then
//!    overwrite the latest key
//! 3. **commit**: replace the metadata record, guarded by its revision
//!
//! Steps 1 and 2 only ever create or overwrite blobs with the bytes they are
//! meant to hold, so any prefix of the sequence can be replayed. A crash
//! before step 3 leaves the record untouched; the worst outcome is a durable
//! versioned blob that nothing references yet.

use crate::blob::{attr, compute_etag, BlobStore, PutOptions};
use crate::error::{Result, VaultError};
use crate::layout::{ContentSource, RecordLayout, ScreenKeys};
use crate::ledger::LedgerEntry;
use crate::screen::ScreenRecord;
use crate::validation::{AppId, ScreenName};
use crate::version::ScreenVersion;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Result of the archive step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    /// Ledger entry describing the archived version
    pub entry: LedgerEntry,

    /// Key the archive was copied from, if it had to be rebuilt
    pub healed_from: Option<String>,
}

/// Size and etag of freshly written content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenContent {
    pub version: ScreenVersion,
    pub size: u64,
    pub etag: String,
    pub content_type: String,
    pub written_at: DateTime<Utc>,
}

/// Effective layout of a record, treating a record that points at the flat
/// key as legacy even if it predates the `layout` field
pub fn effective_layout(record: &ScreenRecord, keys: &ScreenKeys) -> RecordLayout {
    if record.layout == RecordLayout::Legacy || record.current_blob_key == keys.legacy() {
        RecordLayout::Legacy
    } else {
        RecordLayout::Versioned
    }
}

pub(crate) fn blob_options(
    app: &AppId,
    name: &ScreenName,
    version: &ScreenVersion,
    content_type: &str,
    etag: &str,
    at: DateTime<Utc>,
) -> PutOptions {
    PutOptions::new(content_type)
        .with_attribute(attr::VERSION, version.to_string())
        .with_attribute(attr::SCREEN, name.as_str())
        .with_attribute(attr::APP, app.key_segment())
        .with_attribute(attr::UPLOADED_AT, at.to_rfc3339())
        .with_attribute(attr::ETAG, etag)
}

/// Read the first reachable source
///
/// `NotFound` moves on to the next candidate; any other failure is returned
/// as is. If nothing is reachable the result is `Corruption`.
pub async fn read_first<B: BlobStore + ?Sized>(
    blobs: &B,
    sources: &[ContentSource],
    what: &str,
) -> Result<(Bytes, ContentSource)> {
    read_verified(blobs, sources, None, what).await
}

/// Like [`read_first`], but a source whose bytes do not hash to `expected`
/// counts as stale and is skipped
///
/// The latest key can briefly hold bytes of a transition whose commit was
/// rejected; the recorded etag tells them apart.
pub async fn read_verified<B: BlobStore + ?Sized>(
    blobs: &B,
    sources: &[ContentSource],
    expected: Option<&str>,
    what: &str,
) -> Result<(Bytes, ContentSource)> {
    for (idx, source) in sources.iter().enumerate() {
        match blobs.get(source.key()).await {
            Ok(data) => {
                if expected.is_some_and(|want| compute_etag(&data) != want) {
                    warn!("{} at {} does not match its recorded etag", what, source.key());
                    continue;
                }
                if idx > 0 {
                    warn!("Read {} from fallback {}", what, source.key());
                }
                return Ok((data, source.clone()));
            }
            Err(VaultError::NotFound(_)) => {
                debug!("{} not at {}", what, source.key());
            }
            Err(e) => return Err(e),
        }
    }

    let tried: Vec<&str> = sources.iter().map(ContentSource::key).collect();
    Err(VaultError::Corruption(format!(
        "{} unreachable at any of [{}]",
        what,
        tried.join(", ")
    )))
}

/// Step 2: write content to its versioned key, then to the latest key
pub async fn write_dual<B: BlobStore + ?Sized>(
    blobs: &B,
    keys: &ScreenKeys,
    app: &AppId,
    name: &ScreenName,
    version: &ScreenVersion,
    content: Bytes,
    content_type: &str,
) -> Result<WrittenContent> {
    let written_at = Utc::now();
    let etag = compute_etag(&content);
    let size = content.len() as u64;
    let options = blob_options(app, name, version, content_type, &etag, written_at);

    // Versioned key first: if the latest write fails, the archive is durable
    // and the latest pointer is merely stale.
    blobs
        .put(&keys.versioned(version), content.clone(), options.clone())
        .await?;
    blobs.put(&keys.latest(), content, options).await?;

    debug!("Wrote {} bytes for {}/{} v{}", size, app, name, version);

    Ok(WrittenContent {
        version: version.clone(),
        size,
        etag,
        content_type: content_type.to_string(),
        written_at,
    })
}

/// An in-flight transition of one screen away from its observed state
#[derive(Debug)]
pub struct Transition<'a> {
    keys: &'a ScreenKeys,
    observed: &'a ScreenRecord,
    layout: RecordLayout,
}

impl<'a> Transition<'a> {
    pub fn new(keys: &'a ScreenKeys, observed: &'a ScreenRecord) -> Self {
        let layout = effective_layout(observed, keys);
        Transition {
            keys,
            observed,
            layout,
        }
    }

    pub fn observed(&self) -> &ScreenRecord {
        self.observed
    }

    /// Step 1: ensure the observed current version is archived
    ///
    /// Idempotent: when the versioned key already exists nothing is written.
    pub async fn archive_current<B: BlobStore + ?Sized>(&self, blobs: &B) -> Result<ArchiveOutcome> {
        let current = &self.observed.current_version;
        let archive_key = self.keys.versioned(current);
        let archived_at = Utc::now();

        match blobs.head(&archive_key).await {
            Ok(head) => {
                debug!("v{} already archived at {}", current, archive_key);
                return Ok(ArchiveOutcome {
                    entry: LedgerEntry {
                        version: current.clone(),
                        blob_key: archive_key,
                        size: head.object.size,
                        archived_at,
                        origin: self.layout,
                    },
                    healed_from: None,
                });
            }
            Err(VaultError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let sources: Vec<ContentSource> = self
            .keys
            .current_sources(self.layout, current)
            .into_iter()
            .filter(|source| source.key() != archive_key)
            .collect();
        let what = format!("{}/{} v{}", self.observed.app, self.observed.name, current);
        let expected = self.observed.current_etag.as_deref();
        let (data, source) = read_verified(blobs, &sources, expected, &what).await?;

        warn!(
            "Archive for {} missing, rebuilding from {}",
            what,
            source.key()
        );

        let etag = compute_etag(&data);
        let size = data.len() as u64;
        let options = blob_options(
            &self.observed.app,
            &self.observed.name,
            current,
            &self.observed.content_type,
            &etag,
            archived_at,
        );
        blobs.put(&archive_key, data, options).await?;

        Ok(ArchiveOutcome {
            entry: LedgerEntry {
                version: current.clone(),
                blob_key: archive_key,
                size,
                archived_at,
                origin: self.layout,
            },
            healed_from: Some(source.key().to_string()),
        })
    }

    /// Step 3 input: the record to commit once both blob steps succeeded
    pub fn next_record(&self, archived: LedgerEntry, written: WrittenContent) -> Result<ScreenRecord> {
        let mut next = self.observed.clone();
        next.ledger.append(archived)?;
        next.current_version = written.version;
        next.current_blob_key = self.keys.latest();
        next.current_size = written.size;
        next.current_etag = Some(written.etag);
        next.content_type = written.content_type;
        next.layout = RecordLayout::Versioned;
        next.updated_at = written.written_at;
        Ok(next)
    }
}
