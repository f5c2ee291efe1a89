//! Deterministic blob key layout for screens
//!
//! ```text
//! {root}/{app}/{screen}/latest.json       mutable, mirrors the current version
//! {root}/{app}/{screen}/v{version}.json   immutable archive of one version
//! {root}/{app}/{screen}.json              legacy flat key (pre-versioning)
//! ```
//!
//! The layout is compatibility-relevant: existing buckets are read with it.

use crate::error::{Result, VaultError};
use crate::validation::{AppId, ScreenName};
use crate::version::ScreenVersion;

/// Default key root
pub const DEFAULT_KEY_ROOT: &str = "apps";

const LATEST_FILE: &str = "latest.json";

/// Key layout rooted at a configurable prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    root: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        KeyLayout {
            root: DEFAULT_KEY_ROOT.to_string(),
        }
    }
}

impl KeyLayout {
    /// Create a layout rooted at `root` (e.g. `"apps"`)
    pub fn new(root: impl Into<String>) -> Result<Self> {
        let root = root.into();
        let trimmed = root.trim_matches('/');
        if trimmed.is_empty() || trimmed.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(VaultError::Config(format!("invalid key root '{}'", root)));
        }
        Ok(KeyLayout {
            root: trimmed.to_string(),
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Prefix holding every screen of an application
    pub fn app_prefix(&self, app: &AppId) -> String {
        format!("{}/{}/", self.root, app.key_segment())
    }

    /// Keys for one screen
    pub fn screen(&self, app: &AppId, name: &ScreenName) -> ScreenKeys {
        let base = format!("{}/{}/{}", self.root, app.key_segment(), name);
        ScreenKeys {
            prefix: format!("{}/", base),
            legacy: format!("{}.json", base),
        }
    }
}

/// All blob keys belonging to one screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenKeys {
    prefix: String,
    legacy: String,
}

impl ScreenKeys {
    /// Directory-style prefix covering the latest and versioned keys
    ///
    /// The legacy flat key lies outside this prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn latest(&self) -> String {
        format!("{}{}", self.prefix, LATEST_FILE)
    }

    pub fn versioned(&self, version: &ScreenVersion) -> String {
        format!("{}v{}.json", self.prefix, version)
    }

    pub fn legacy(&self) -> &str {
        &self.legacy
    }

    /// Recover the version from a versioned key under this screen's prefix
    pub fn parse_versioned(&self, key: &str) -> Option<ScreenVersion> {
        key.strip_prefix(&self.prefix)?
            .strip_prefix('v')?
            .strip_suffix(".json")
            .and_then(|raw| ScreenVersion::parse(raw).ok())
    }

    /// Read order for the current version's content
    pub fn current_sources(&self, layout: RecordLayout, current: &ScreenVersion) -> Vec<ContentSource> {
        match layout {
            RecordLayout::Versioned => vec![
                ContentSource::Latest(self.latest()),
                ContentSource::Versioned(self.versioned(current)),
            ],
            RecordLayout::Legacy => vec![
                ContentSource::Legacy(self.legacy.clone()),
                ContentSource::Versioned(self.versioned(current)),
            ],
        }
    }

    /// Read order for an archived ledger version
    ///
    /// Only a version archived from a legacy record may be read back from the
    /// flat key; that key holds nothing else.
    pub fn archived_sources(&self, version: &ScreenVersion, origin: RecordLayout) -> Vec<ContentSource> {
        let mut sources = vec![ContentSource::Versioned(self.versioned(version))];
        if origin == RecordLayout::Legacy {
            sources.push(ContentSource::Legacy(self.legacy.clone()));
        }
        sources
    }
}

/// How a screen's current content is laid out in the blob store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordLayout {
    /// Content at `latest.json` with per-version archives
    #[default]
    Versioned,
    /// Written before versioning existed: content only at the flat key,
    /// implicit single version, empty ledger
    Legacy,
}

/// A concrete place content may be read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    Latest(String),
    Versioned(String),
    Legacy(String),
}

impl ContentSource {
    pub fn key(&self) -> &str {
        match self {
            ContentSource::Latest(key)
            | ContentSource::Versioned(key)
            | ContentSource::Legacy(key) => key,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, ContentSource::Legacy(_))
    }
}
