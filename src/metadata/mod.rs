//! Metadata store: the document database holding screen records
//!
//! Records are keyed by (app namespace, screen name). Every write after the
//! initial insert is a compare-and-swap on the record's `revision`: a commit
//! whose expected revision no longer matches is rejected with
//! `ConcurrentModification`, so two racing uploads cannot silently overwrite
//! each other's ledger entry.

mod fs;
mod memory;

pub use fs::FsMetadataStore;
pub use memory::MemoryMetadataStore;

use crate::error::Result;
use crate::screen::ScreenRecord;
use crate::validation::{AppId, ScreenName};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Document store for screen records
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, app: &AppId, name: &ScreenName) -> Result<Option<ScreenRecord>>;

    /// Insert a new record with revision 1; `AlreadyExists` if the identity is taken
    async fn insert(&self, record: ScreenRecord) -> Result<ScreenRecord>;

    /// Replace a record if its stored revision equals `expected_revision`
    ///
    /// The committed record carries `expected_revision + 1`.
    async fn commit(&self, record: ScreenRecord, expected_revision: u64) -> Result<ScreenRecord>;

    /// Remove a record; returns whether it existed
    async fn remove(&self, app: &AppId, name: &ScreenName) -> Result<bool>;

    /// All records, or those of one application
    async fn list(&self, app: Option<&AppId>) -> Result<Vec<ScreenRecord>>;
}

#[async_trait]
impl<T: MetadataStore + ?Sized> MetadataStore for Arc<T> {
    async fn get(&self, app: &AppId, name: &ScreenName) -> Result<Option<ScreenRecord>> {
        (**self).get(app, name).await
    }

    async fn insert(&self, record: ScreenRecord) -> Result<ScreenRecord> {
        (**self).insert(record).await
    }

    async fn commit(&self, record: ScreenRecord, expected_revision: u64) -> Result<ScreenRecord> {
        (**self).commit(record, expected_revision).await
    }

    async fn remove(&self, app: &AppId, name: &ScreenName) -> Result<bool> {
        (**self).remove(app, name).await
    }

    async fn list(&self, app: Option<&AppId>) -> Result<Vec<ScreenRecord>> {
        (**self).list(app).await
    }
}

/// Filter and pagination for listing an application's screens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenQuery {
    /// Case-insensitive substring over screen name and display name
    #[serde(default)]
    pub search: Option<String>,

    /// Restrict to active or inactive screens
    #[serde(default)]
    pub is_active: Option<bool>,

    /// 1-based page number
    pub page: usize,

    /// Page size
    pub limit: usize,
}

impl Default for ScreenQuery {
    fn default() -> Self {
        ScreenQuery {
            search: None,
            is_active: None,
            page: 1,
            limit: 20,
        }
    }
}

/// One page of a screen listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenPage {
    pub screens: Vec<ScreenRecord>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

impl ScreenQuery {
    pub fn matches(&self, record: &ScreenRecord) -> bool {
        if let Some(active) = self.is_active {
            if record.is_active != active {
                return false;
            }
        }
        match self.search.as_deref() {
            Some(needle) if !needle.is_empty() => record.matches_search(needle),
            _ => true,
        }
    }

    /// Filter, order newest first, and cut out the requested page
    pub fn apply(&self, records: Vec<ScreenRecord>) -> ScreenPage {
        let page = self.page.max(1);
        let limit = self.limit.max(1);

        let mut matching: Vec<_> = records.into_iter().filter(|r| self.matches(r)).collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });

        let total = matching.len();
        let screens = matching
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        ScreenPage {
            screens,
            page,
            limit,
            total,
            pages: total.div_ceil(limit),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::conformance::record;
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_query_filters_and_paginates() {
        let mut records = Vec::new();
        for i in 0..5 {
            let mut r = record("com.a", &format!("screen{}", i));
            r.created_at = r.created_at + Duration::seconds(i);
            r.is_active = i != 2;
            records.push(r);
        }

        let page = ScreenQuery {
            is_active: Some(true),
            limit: 3,
            ..Default::default()
        }
        .apply(records.clone());

        assert_eq!(page.total, 4);
        assert_eq!(page.pages, 2);
        assert_eq!(page.screens.len(), 3);
        assert_eq!(page.screens[0].name.as_str(), "screen4");

        let second = ScreenQuery {
            is_active: Some(true),
            limit: 3,
            page: 2,
            ..Default::default()
        }
        .apply(records.clone());
        assert_eq!(second.screens.len(), 1);
        assert_eq!(second.screens[0].name.as_str(), "screen0");

        let search = ScreenQuery {
            search: Some("SCREEN3".into()),
            ..Default::default()
        }
        .apply(records);
        assert_eq!(search.total, 1);
    }

    #[test]
    fn test_query_clamps_zero_page_and_limit() {
        let page = ScreenQuery {
            page: 0,
            limit: 0,
            ..Default::default()
        }
        .apply(vec![record("com.a", "home")]);

        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 1);
        assert_eq!(page.screens.len(), 1);
    }
}
