//! Validation for screen names and application identifiers
//!
//! Upstream request validation is expected to have run already; these newtypes
//! re-check the properties the key layout depends on so that a malformed value
//! can never produce a key outside its screen's prefix.

use crate::error::{Result, VaultError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> Result<&'static Regex> {
    if let Some(re) = cell.get() {
        return Ok(re);
    }
    let re = Regex::new(pattern)
        .map_err(|e| VaultError::Config(format!("invalid pattern {}: {}", pattern, e)))?;
    Ok(cell.get_or_init(|| re))
}

/// A validated screen name
///
/// # Rules
/// - ASCII letters, digits, hyphens (-) and underscores (_) only
/// - Length: 1-128 characters
///
/// # Examples
///
/// ```
/// use screenvault::ScreenName;
///
/// let name = ScreenName::new("home_v2-dark").unwrap();
/// assert_eq!(name.as_str(), "home_v2-dark");
///
/// assert!(ScreenName::new("home screen").is_err());
/// assert!(ScreenName::new("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScreenName(String);

impl ScreenName {
    const PATTERN: &'static str = r"^[A-Za-z0-9_-]+$";

    const MAX_LENGTH: usize = 128;

    pub fn new(name: impl Into<String>) -> Result<Self> {
        static RE: OnceLock<Regex> = OnceLock::new();

        let name = name.into();
        if name.is_empty() {
            return Err(VaultError::InvalidScreenName(
                "name cannot be empty".to_string(),
            ));
        }
        if name.len() > Self::MAX_LENGTH {
            return Err(VaultError::InvalidScreenName(format!(
                "name too long (max {} characters)",
                Self::MAX_LENGTH
            )));
        }
        if !compiled(&RE, Self::PATTERN)?.is_match(&name) {
            return Err(VaultError::InvalidScreenName(name));
        }
        Ok(ScreenName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ScreenName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScreenName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ScreenName {
    type Error = VaultError;

    fn try_from(value: String) -> Result<Self> {
        ScreenName::new(value)
    }
}

impl From<ScreenName> for String {
    fn from(name: ScreenName) -> Self {
        name.0
    }
}

/// Opaque application identity supplied by the account service
///
/// `owner` is carried for bookkeeping only; `namespace` (the app's package
/// name, e.g. `com.example.shop`) is globally unique and forms the storage
/// key segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppId {
    owner: String,
    namespace: String,
}

impl AppId {
    const NAMESPACE_PATTERN: &'static str = r"^[A-Za-z0-9][A-Za-z0-9._-]*$";

    /// Create an app identity
    ///
    /// # Examples
    ///
    /// ```
    /// use screenvault::AppId;
    ///
    /// let app = AppId::new("dev-42", "com.example.shop").unwrap();
    /// assert_eq!(app.key_segment(), "com.example.shop");
    ///
    /// assert!(AppId::new("dev-42", "com/example").is_err());
    /// assert!(AppId::new("dev-42", "..").is_err());
    /// ```
    pub fn new(owner: impl Into<String>, namespace: impl Into<String>) -> Result<Self> {
        static RE: OnceLock<Regex> = OnceLock::new();

        let owner = owner.into();
        let namespace = namespace.into();

        if owner.trim().is_empty() {
            return Err(VaultError::InvalidAppId("owner cannot be empty".to_string()));
        }
        if !compiled(&RE, Self::NAMESPACE_PATTERN)?.is_match(&namespace)
            || namespace.contains("..")
        {
            return Err(VaultError::InvalidAppId(format!(
                "namespace '{}' must be letters, digits, dots, hyphens or underscores",
                namespace
            )));
        }

        Ok(AppId { owner, namespace })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The segment used in blob keys and metadata identities
    pub fn key_segment(&self) -> &str {
        &self.namespace
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_screen_names() {
        for name in ["home", "Home_2", "a", "checkout-step-1", "___"] {
            assert!(ScreenName::new(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_screen_names() {
        for name in ["", "home screen", "home.json", "a/b", "café", "x\n"] {
            assert!(ScreenName::new(name).is_err(), "{:?} should be invalid", name);
        }
        assert!(ScreenName::new("a".repeat(129)).is_err());
    }

    #[test]
    fn test_screen_name_serde_validates() {
        let ok: ScreenName = serde_json::from_str("\"home\"").unwrap();
        assert_eq!(ok.as_str(), "home");
        assert!(serde_json::from_str::<ScreenName>("\"bad name\"").is_err());
    }

    #[test]
    fn test_app_id() {
        let app = AppId::new("owner-1", "com.example.app").unwrap();
        assert_eq!(app.owner(), "owner-1");
        assert_eq!(app.key_segment(), "com.example.app");
        assert_eq!(app.to_string(), "com.example.app");

        assert!(AppId::new("", "com.example").is_err());
        assert!(AppId::new("o", "").is_err());
        assert!(AppId::new("o", ".hidden").is_err());
        assert!(AppId::new("o", "a..b").is_err());
        assert!(AppId::new("o", "a b").is_err());
    }
}
