//! Error types for screen registry operations

use thiserror::Error;

/// Registry operation result type
pub type Result<T> = std::result::Result<T, VaultError>;

/// Registry operation errors
#[derive(Error, Debug)]
pub enum VaultError {
    /// Screen, version, or blob does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A screen with the same (app, name) identity already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Submitted version does not advance past the current version
    #[error("Version {submitted} does not advance past current version {current}")]
    VersionNotAdvancing { submitted: String, current: String },

    /// Rollback target equals the current version or is absent from the ledger
    #[error("Invalid rollback: {0}")]
    InvalidRollback(String),

    /// Transient failure in the blob store or metadata store
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Ledger references a blob unreachable via both versioned and legacy keys
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Metadata commit observed a stale revision
    #[error("Concurrent modification: expected revision {expected}, found {found}")]
    ConcurrentModification { expected: u64, found: u64 },

    /// Screen is deactivated and cannot be served to clients
    #[error("Screen is inactive: {0}")]
    Inactive(String),

    #[error("Invalid version: {0} (expected MAJOR.MINOR.PATCH, e.g. 1.0.0)")]
    InvalidVersion(String),

    #[error("Invalid screen name: {0} (letters, numbers, hyphens and underscores only)")]
    InvalidScreenName(String),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Invalid app identifier: {0}")]
    InvalidAppId(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::StorageUnavailable(_) | VaultError::ConcurrentModification { .. }
        )
    }

    /// Fold low-level corruption into a `NotFound` carrying the diagnostic
    pub(crate) fn surface_corruption(self) -> Self {
        match self {
            VaultError::Corruption(detail) => {
                VaultError::NotFound(format!("content unreachable ({})", detail))
            }
            other => other,
        }
    }
}
