//! Vault configuration and the builder that wires filesystem backends
//!
//! Configuration is read from a TOML file, then overridden by environment
//! variables:
//!
//! | variable                    | field              |
//! |-----------------------------|--------------------|
//! | `SCREENVAULT_BLOB_ROOT`     | `blob_root`        |
//! | `SCREENVAULT_METADATA_ROOT` | `metadata_root`    |
//! | `SCREENVAULT_TIMEOUT_MS`    | `blob_timeout_ms`  |
//! | `SCREENVAULT_KEY_ROOT`      | `key_root`         |

use crate::blob::{FsBlobStore, TimeoutBlobStore, JSON_CONTENT_TYPE};
use crate::error::{Result, VaultError};
use crate::layout::{KeyLayout, DEFAULT_KEY_ROOT};
use crate::manager::VersionManager;
use crate::metadata::FsMetadataStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const ENV_BLOB_ROOT: &str = "SCREENVAULT_BLOB_ROOT";
pub const ENV_METADATA_ROOT: &str = "SCREENVAULT_METADATA_ROOT";
pub const ENV_TIMEOUT_MS: &str = "SCREENVAULT_TIMEOUT_MS";
pub const ENV_KEY_ROOT: &str = "SCREENVAULT_KEY_ROOT";

/// Manager over the filesystem backends
pub type FsVersionManager = VersionManager<TimeoutBlobStore<FsBlobStore>, FsMetadataStore>;

fn default_key_root() -> String {
    DEFAULT_KEY_ROOT.to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_content_type() -> String {
    JSON_CONTENT_TYPE.to_string()
}

fn default_true() -> bool {
    true
}

/// Settings for a filesystem-backed vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Directory of the blob store
    pub blob_root: PathBuf,

    /// Directory of the metadata store
    pub metadata_root: PathBuf,

    #[serde(default = "default_key_root")]
    pub key_root: String,

    /// Per-call deadline for blob operations
    #[serde(default = "default_timeout_ms")]
    pub blob_timeout_ms: u64,

    #[serde(default = "default_content_type")]
    pub default_content_type: String,

    #[serde(default = "default_true")]
    pub reconcile_on_startup: bool,
}

impl VaultConfig {
    /// Config with default settings under one data directory
    pub fn with_data_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        VaultConfig {
            blob_root: dir.join("blobs"),
            metadata_root: dir.join("metadata"),
            key_root: default_key_root(),
            blob_timeout_ms: default_timeout_ms(),
            default_content_type: default_content_type(),
            reconcile_on_startup: true,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: VaultConfig =
            toml::from_str(raw).map_err(|e| VaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| VaultError::Config(format!("reading {:?}: {}", path, e)))?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        info!("Loaded vault configuration from {:?}", path);
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_BLOB_ROOT) {
            self.blob_root = PathBuf::from(root);
        }
        if let Some(root) = lookup(ENV_METADATA_ROOT) {
            self.metadata_root = PathBuf::from(root);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.blob_timeout_ms = raw.trim().parse().map_err(|_| {
                VaultError::Config(format!("{} must be milliseconds, got '{}'", ENV_TIMEOUT_MS, raw))
            })?;
        }
        if let Some(root) = lookup(ENV_KEY_ROOT) {
            self.key_root = root;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.blob_timeout_ms == 0 {
            return Err(VaultError::Config("blob_timeout_ms must be positive".into()));
        }
        if self.default_content_type.trim().is_empty() {
            return Err(VaultError::Config("default_content_type is empty".into()));
        }
        KeyLayout::new(self.key_root.as_str())?;
        Ok(())
    }

    pub fn blob_timeout(&self) -> Duration {
        Duration::from_millis(self.blob_timeout_ms)
    }
}

/// Builder for a filesystem-backed [`VersionManager`]
///
/// # Examples
///
/// ```rust,no_run
/// use screenvault::VaultBuilder;
///
/// # async fn run() -> screenvault::Result<()> {
/// let manager = VaultBuilder::new()
///     .data_dir("/var/lib/screenvault")
///     .timeout_ms(5_000)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct VaultBuilder {
    config: Option<VaultConfig>,
    data_dir: Option<PathBuf>,
    timeout_ms: Option<u64>,
    key_root: Option<String>,
    reconcile: Option<bool>,
}

impl VaultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a complete configuration
    pub fn config(mut self, config: VaultConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `{dir}/blobs` and `{dir}/metadata` when no config is given
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn timeout_ms(mut self, millis: u64) -> Self {
        self.timeout_ms = Some(millis);
        self
    }

    pub fn key_root(mut self, root: impl Into<String>) -> Self {
        self.key_root = Some(root.into());
        self
    }

    /// Override `reconcile_on_startup`
    pub fn reconcile(mut self, enabled: bool) -> Self {
        self.reconcile = Some(enabled);
        self
    }

    fn resolve(self) -> Result<VaultConfig> {
        let mut config = match (self.config, self.data_dir) {
            (Some(config), _) => config,
            (None, Some(dir)) => VaultConfig::with_data_dir(dir),
            (None, None) => {
                return Err(VaultError::Config(
                    "either a config or a data directory must be set".into(),
                ))
            }
        };
        if let Some(millis) = self.timeout_ms {
            config.blob_timeout_ms = millis;
        }
        if let Some(root) = self.key_root {
            config.key_root = root;
        }
        if let Some(enabled) = self.reconcile {
            config.reconcile_on_startup = enabled;
        }
        config.validate()?;
        Ok(config)
    }

    /// Open the stores and, if enabled, run a reconciliation pass
    pub async fn build(self) -> Result<FsVersionManager> {
        let config = self.resolve()?;

        let blobs = TimeoutBlobStore::new(
            FsBlobStore::open(&config.blob_root).await?,
            config.blob_timeout(),
        );
        let metadata = FsMetadataStore::open(&config.metadata_root).await?;
        let manager = VersionManager::new(blobs, metadata)
            .with_layout(KeyLayout::new(config.key_root.as_str())?)
            .with_content_type(config.default_content_type.as_str());

        info!(
            "Vault ready (blobs {:?}, metadata {:?}, timeout {:?})",
            config.blob_root,
            config.metadata_root,
            config.blob_timeout()
        );

        if config.reconcile_on_startup {
            let report = manager.reconcile(None).await?;
            if report.corrupt > 0 {
                warn!(
                    "Startup reconciliation found {} corrupt item(s)",
                    report.corrupt
                );
            }
        }

        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_toml_defaults() {
        let config = VaultConfig::from_toml_str(
            r#"
            blob_root = "/data/blobs"
            metadata_root = "/data/meta"
            "#,
        )
        .unwrap();

        assert_eq!(config.key_root, "apps");
        assert_eq!(config.blob_timeout(), Duration::from_secs(10));
        assert_eq!(config.default_content_type, "application/json");
        assert!(config.reconcile_on_startup);
    }

    #[test]
    fn test_toml_rejects_bad_values() {
        let zero = VaultConfig::from_toml_str(
            r#"
            blob_root = "b"
            metadata_root = "m"
            blob_timeout_ms = 0
            "#,
        );
        assert!(matches!(zero, Err(VaultError::Config(_))));

        let missing = VaultConfig::from_toml_str(r#"blob_root = "b""#);
        assert!(matches!(missing, Err(VaultError::Config(_))));

        let escaping = VaultConfig::from_toml_str(
            r#"
            blob_root = "b"
            metadata_root = "m"
            key_root = "../up"
            "#,
        );
        assert!(matches!(escaping, Err(VaultError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_BLOB_ROOT, "/override/blobs"),
            (ENV_TIMEOUT_MS, "2500"),
            (ENV_KEY_ROOT, "screens"),
        ]
        .into_iter()
        .collect();

        let mut config = VaultConfig::with_data_dir("/data");
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.blob_root, PathBuf::from("/override/blobs"));
        assert_eq!(config.metadata_root, PathBuf::from("/data/metadata"));
        assert_eq!(config.blob_timeout_ms, 2500);
        assert_eq!(config.key_root, "screens");

        let bad = config.apply_overrides(|name| (name == ENV_TIMEOUT_MS).then(|| "soon".to_string()));
        assert!(matches!(bad, Err(VaultError::Config(_))));
    }

    #[tokio::test]
    async fn test_builder_requires_location() {
        let err = VaultBuilder::new().build().await.unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));
    }

    #[tokio::test]
    async fn test_builder_opens_fs_backends() {
        let dir = TempDir::new().unwrap();
        let manager = VaultBuilder::new()
            .data_dir(dir.path())
            .timeout_ms(1_000)
            .key_root("screens")
            .build()
            .await
            .unwrap();

        assert_eq!(manager.layout().root(), "screens");
        assert_eq!(manager.blobs().timeout(), Duration::from_secs(1));
        assert!(dir.path().join("blobs").is_dir());
        assert!(dir.path().join("metadata").is_dir());
    }
}
