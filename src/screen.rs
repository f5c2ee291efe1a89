//! Screen metadata record
//!
//! One document per (app, screen name) in the metadata store. It carries the
//! current version pointer, the version ledger, descriptive details, the
//! activation flag and access counters.

use crate::layout::RecordLayout;
use crate::ledger::VersionLedger;
use crate::validation::{AppId, ScreenName};
use crate::version::ScreenVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptive, non-versioned fields of a screen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenDetails {
    /// Display name; defaults to the screen name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Partial update of a screen's details and activation flag
///
/// `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenDetailsPatch {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl ScreenDetailsPatch {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.is_active.is_none()
    }
}

/// The metadata document for one screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRecord {
    pub app: AppId,
    pub name: ScreenName,

    #[serde(default)]
    pub details: ScreenDetails,

    pub current_version: ScreenVersion,

    /// Key the current content is served from
    pub current_blob_key: String,
    pub current_size: u64,

    /// Hex SHA-256 of the current content; absent for legacy records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_etag: Option<String>,

    pub content_type: String,

    #[serde(default)]
    pub ledger: VersionLedger,

    #[serde(default)]
    pub layout: RecordLayout,

    pub is_active: bool,
    pub access_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Commit counter used for optimistic concurrency; starts at 1
    #[serde(default)]
    pub revision: u64,
}

impl ScreenRecord {
    /// Human-readable name
    pub fn display_name(&self) -> &str {
        self.details
            .display_name
            .as_deref()
            .unwrap_or_else(|| self.name.as_str())
    }

    /// Whether the record was written before versioning existed
    pub fn is_legacy(&self) -> bool {
        self.layout == RecordLayout::Legacy
    }

    pub fn apply_patch(&mut self, patch: ScreenDetailsPatch) {
        if let Some(display_name) = patch.display_name {
            self.details.display_name = Some(display_name);
        }
        if let Some(description) = patch.description {
            self.details.description = Some(description);
        }
        if let Some(category) = patch.category {
            self.details.category = Some(category);
        }
        if let Some(tags) = patch.tags {
            self.details.tags = tags;
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
    }

    /// Case-insensitive match of `needle` against name and display name
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.name.as_str().to_lowercase().contains(&needle)
            || self.display_name().to_lowercase().contains(&needle)
    }

    /// Record an access by a client
    pub fn track_access(&mut self, at: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed = Some(at);
    }
}

/// Version listing row: ledger entries plus the current version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: ScreenVersion,
    pub blob_key: String,
    pub size: u64,
    pub is_current: bool,

    /// When the version was archived; `None` for the current version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ScreenRecord {
        let now = Utc::now();
        ScreenRecord {
            app: AppId::new("dev", "com.example.app").unwrap(),
            name: ScreenName::new("home").unwrap(),
            details: ScreenDetails::default(),
            current_version: ScreenVersion::parse("1.0.0").unwrap(),
            current_blob_key: "apps/com.example.app/home/latest.json".to_string(),
            current_size: 2,
            current_etag: None,
            content_type: "application/json".to_string(),
            ledger: VersionLedger::new(),
            layout: RecordLayout::Versioned,
            is_active: true,
            access_count: 0,
            last_accessed: None,
            created_at: now,
            updated_at: now,
            revision: 1,
        }
    }

    #[test]
    fn test_display_name_defaults_to_name() {
        let mut record = sample_record();
        assert_eq!(record.display_name(), "home");

        record.details.display_name = Some("Home Screen".into());
        assert_eq!(record.display_name(), "Home Screen");
    }

    #[test]
    fn test_apply_patch() {
        let mut record = sample_record();
        record.apply_patch(ScreenDetailsPatch {
            description: Some("Landing".into()),
            tags: Some(vec!["main".into()]),
            is_active: Some(false),
            ..Default::default()
        });

        assert_eq!(record.details.description.as_deref(), Some("Landing"));
        assert_eq!(record.details.tags, vec!["main".to_string()]);
        assert!(!record.is_active);
        assert!(record.details.display_name.is_none());
    }

    #[test]
    fn test_matches_search() {
        let mut record = sample_record();
        record.details.display_name = Some("Main Landing".into());

        assert!(record.matches_search("HOM"));
        assert!(record.matches_search("landing"));
        assert!(!record.matches_search("checkout"));
    }

    #[test]
    fn test_record_json_roundtrip_defaults() {
        let record = sample_record();
        let mut json = serde_json::to_value(&record).unwrap();

        // Older documents lack the versioning fields.
        let obj = json.as_object_mut().unwrap();
        obj.remove("ledger");
        obj.remove("layout");
        obj.remove("revision");

        let back: ScreenRecord = serde_json::from_value(json).unwrap();
        assert!(back.ledger.is_empty());
        assert_eq!(back.layout, RecordLayout::Versioned);
        assert_eq!(back.revision, 0);
    }
}
