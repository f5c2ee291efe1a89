//! Version ledger: the ordered history of superseded versions
//!
//! The ledger lives inside a screen's metadata record. Entries are appended
//! in strictly increasing version order and never modified afterwards.

use crate::error::{Result, VaultError};
use crate::layout::RecordLayout;
use crate::version::ScreenVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One archived version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub version: ScreenVersion,

    /// Blob key holding this version's bytes
    pub blob_key: String,

    /// Payload size in bytes
    pub size: u64,

    /// When the version was superseded and archived
    pub archived_at: DateTime<Utc>,

    /// Layout of the record the version was archived from. Entries written
    /// before this field existed read as `versioned`.
    #[serde(default)]
    pub origin: RecordLayout,
}

impl LedgerEntry {
    /// Whether the legacy flat key may stand in for this entry's archive
    pub fn from_legacy(&self) -> bool {
        self.origin == RecordLayout::Legacy
    }
}

/// Append-only, version-ordered history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionLedger {
    entries: Vec<LedgerEntry>,
}

impl VersionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; its version must be newer than every existing entry
    pub fn append(&mut self, entry: LedgerEntry) -> Result<()> {
        if let Some(last) = self.entries.last() {
            if !entry.version.advances(&last.version) {
                return Err(VaultError::VersionNotAdvancing {
                    submitted: entry.version.to_string(),
                    current: last.version.to_string(),
                });
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn find(&self, version: &ScreenVersion) -> Option<&LedgerEntry> {
        // Entries are sorted, so a binary search is valid.
        self.entries
            .binary_search_by(|entry| entry.version.cmp(version))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    pub fn contains(&self, version: &ScreenVersion) -> bool {
        self.find(version).is_some()
    }

    /// Most recently archived entry
    pub fn newest(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    /// Entries oldest first
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the ledger is strictly ordered and every entry is below `current`
    pub fn is_consistent_with(&self, current: &ScreenVersion) -> bool {
        let ordered = self
            .entries
            .windows(2)
            .all(|pair| pair[1].version.advances(&pair[0].version));
        ordered
            && self
                .entries
                .last()
                .map_or(true, |last| current.advances(&last.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(v: &str) -> LedgerEntry {
        LedgerEntry {
            version: ScreenVersion::parse(v).unwrap(),
            blob_key: format!("apps/a/home/v{}.json", v),
            size: 2,
            archived_at: Utc::now(),
            origin: RecordLayout::Versioned,
        }
    }

    #[test]
    fn test_append_in_order() {
        let mut ledger = VersionLedger::new();
        ledger.append(entry("1.0.0")).unwrap();
        ledger.append(entry("1.0.1")).unwrap();
        ledger.append(entry("2.0.0")).unwrap();

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.newest().unwrap().version.to_string(), "2.0.0");
    }

    #[test]
    fn test_append_rejects_non_advancing() {
        let mut ledger = VersionLedger::new();
        ledger.append(entry("1.0.1")).unwrap();

        assert!(matches!(
            ledger.append(entry("1.0.1")),
            Err(VaultError::VersionNotAdvancing { .. })
        ));
        assert!(ledger.append(entry("1.0.0")).is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_find() {
        let mut ledger = VersionLedger::new();
        for v in ["1.0.0", "1.2.0", "1.10.0"] {
            ledger.append(entry(v)).unwrap();
        }

        let v = ScreenVersion::parse("1.10.0").unwrap();
        assert_eq!(ledger.find(&v).unwrap().blob_key, "apps/a/home/v1.10.0.json");
        assert!(!ledger.contains(&ScreenVersion::parse("1.1.0").unwrap()));
    }

    #[test]
    fn test_consistency() {
        let mut ledger = VersionLedger::new();
        ledger.append(entry("1.0.0")).unwrap();

        assert!(ledger.is_consistent_with(&ScreenVersion::parse("1.0.1").unwrap()));
        assert!(!ledger.is_consistent_with(&ScreenVersion::parse("1.0.0").unwrap()));
        assert!(VersionLedger::new().is_consistent_with(&ScreenVersion::new(0, 0, 0)));
    }

    #[test]
    fn test_serializes_as_array() {
        let mut ledger = VersionLedger::new();
        ledger.append(entry("1.0.0")).unwrap();

        let json = serde_json::to_value(&ledger).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["version"], "1.0.0");
        assert_eq!(json[0]["origin"], "versioned");
    }

    #[test]
    fn test_entry_without_origin_reads_as_versioned() {
        let json = r#"[{"version":"1.0.0","blob_key":"apps/a/home/v1.0.0.json","size":2,"archived_at":"2024-01-01T00:00:00Z"}]"#;
        let ledger: VersionLedger = serde_json::from_str(json).unwrap();
        assert!(!ledger.entries()[0].from_legacy());
    }
}
