//! # ScreenVault - Versioned Screen Registry
//!
//! `screenvault` stores UI-definition documents ("screens") per application
//! with a full version history. Content lives in a blob store, bookkeeping in
//! a metadata store:
//!
//! - **Monotonic versions**: uploads must strictly advance `MAJOR.MINOR.PATCH`
//! - **Archive before overwrite**: the outgoing version is always preserved
//! - **Rollback as a new version**: restoring old content never rewrites history
//! - **Legacy layout**: screens written before versioning stay readable
//! - **Optimistic concurrency**: racing writers are detected, not merged
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use screenvault::{
//!     AppId, MemoryBlobStore, MemoryMetadataStore, Result, ScreenDetails, ScreenName,
//!     ScreenVersion, VersionManager,
//! };
//!
//! # async fn run() -> Result<()> {
//! let manager = VersionManager::new(MemoryBlobStore::new(), MemoryMetadataStore::new());
//! let app = AppId::new("acme", "com.acme.shop")?;
//! let home = ScreenName::new("home")?;
//!
//! manager
//!     .create(&app, &home, &ScreenVersion::parse("1.0.0")?, Bytes::from(r#"{"v":1}"#), ScreenDetails::default())
//!     .await?;
//! manager
//!     .upload(&app, &home, &ScreenVersion::parse("1.1.0")?, Bytes::from(r#"{"v":2}"#))
//!     .await?;
//!
//! // Restores the 1.0.0 content as 1.1.1
//! let record = manager.rollback(&app, &home, &ScreenVersion::parse("1.0.0")?).await?;
//! assert_eq!(record.current_version.to_string(), "1.1.1");
//! # Ok(())
//! # }
//! ```
//!
//! ## Filesystem Backends
//!
//! ```rust,no_run
//! use screenvault::{VaultBuilder, VaultConfig};
//!
//! # async fn run() -> screenvault::Result<()> {
//! let config = VaultConfig::load("screenvault.toml")?;
//! let manager = VaultBuilder::new().config(config).build().await?;
//! # Ok(())
//! # }
//! ```

pub mod blob;
pub mod config;
pub mod error;
pub mod layout;
pub mod ledger;
pub mod manager;
pub mod metadata;
pub mod reconcile;
pub mod screen;
pub mod transition;
pub mod validation;
pub mod version;

pub use blob::{
    BlobMetadata, BlobObject, BlobStore, FsBlobStore, MemoryBlobStore, PutOptions,
    TimeoutBlobStore,
};
pub use config::{FsVersionManager, VaultBuilder, VaultConfig};
pub use error::{Result, VaultError};
pub use layout::{ContentSource, KeyLayout, RecordLayout, ScreenKeys};
pub use ledger::{LedgerEntry, VersionLedger};
pub use manager::{DeleteReport, ScreenContent, VersionCheck, VersionManager};
pub use metadata::{FsMetadataStore, MemoryMetadataStore, MetadataStore, ScreenPage, ScreenQuery};
pub use reconcile::{Finding, ReconcileReport, Reconciler};
pub use screen::{ScreenDetails, ScreenDetailsPatch, ScreenRecord, VersionInfo};
pub use validation::{AppId, ScreenName};
pub use version::{compare_versions, ScreenVersion};
