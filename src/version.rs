//! Dotted version identifiers and their total order
//!
//! Screens are versioned with plain `MAJOR.MINOR.PATCH` triples. Pre-release
//! and build suffixes are not accepted. Two entry points are provided:
//!
//! - [`compare_versions`] orders raw strings, padding missing components with 0
//! - [`ScreenVersion`] is the validated triple used everywhere else

use crate::error::{Result, VaultError};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Parse a single dotted component as an unsigned integer
fn parse_component(raw: &str, component: &str) -> Result<u64> {
    if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VaultError::InvalidVersion(raw.to_string()));
    }
    component
        .parse::<u64>()
        .map_err(|_| VaultError::InvalidVersion(raw.to_string()))
}

fn components(raw: &str) -> Result<Vec<u64>> {
    raw.split('.')
        .map(|component| parse_component(raw, component))
        .collect()
}

/// Compare two dotted version strings component by component
///
/// Components are compared left to right as integers. A missing component is
/// treated as 0, so `"1.2"` equals `"1.2.0"`. The first differing component
/// decides the result.
///
/// # Errors
///
/// Returns `InvalidVersion` if either side has an empty or non-numeric
/// component. Callers are expected to validate input before it gets here.
///
/// # Examples
///
/// ```
/// use screenvault::compare_versions;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_versions("1.0.10", "1.0.9").unwrap(), Ordering::Greater);
/// assert_eq!(compare_versions("2.0", "2.0.0").unwrap(), Ordering::Equal);
/// assert!(compare_versions("1.x.0", "1.0.0").is_err());
/// ```
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    let left = components(a)?;
    let right = components(b)?;
    let len = left.len().max(right.len());

    for idx in 0..len {
        let l = left.get(idx).copied().unwrap_or(0);
        let r = right.get(idx).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            decided => return Ok(decided),
        }
    }

    Ok(Ordering::Equal)
}

/// A validated `MAJOR.MINOR.PATCH` screen version
///
/// Leading zeros are accepted on input and normalized away, so `"01.0.0"`
/// parses to `1.0.0`. Ordering matches [`compare_versions`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScreenVersion(Version);

impl ScreenVersion {
    /// Create a version from its three components
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        ScreenVersion(Version::new(major, minor, patch))
    }

    /// Parse a strict three-component version string
    ///
    /// # Examples
    ///
    /// ```
    /// use screenvault::ScreenVersion;
    ///
    /// let v = ScreenVersion::parse("1.4.2").unwrap();
    /// assert_eq!(v.to_string(), "1.4.2");
    ///
    /// assert!(ScreenVersion::parse("1.4").is_err());
    /// assert!(ScreenVersion::parse("1.4.2-beta").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let parts = components(raw)?;
        match parts.as_slice() {
            [major, minor, patch] => Ok(ScreenVersion::new(*major, *minor, *patch)),
            _ => Err(VaultError::InvalidVersion(raw.to_string())),
        }
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// Mint the next version by incrementing the least significant component
    ///
    /// Used by rollback, which always records a forward move.
    pub fn next_patch(&self) -> Result<Self> {
        let patch = self
            .0
            .patch
            .checked_add(1)
            .ok_or_else(|| VaultError::InvalidVersion(format!("{} has no successor", self)))?;
        Ok(ScreenVersion::new(self.0.major, self.0.minor, patch))
    }

    /// Whether `self` is strictly newer than `other`
    pub fn advances(&self, other: &ScreenVersion) -> bool {
        self > other
    }

    pub fn as_semver(&self) -> &Version {
        &self.0
    }
}

impl fmt::Display for ScreenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0.major, self.0.minor, self.0.patch)
    }
}

impl FromStr for ScreenVersion {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        ScreenVersion::parse(s)
    }
}

impl TryFrom<String> for ScreenVersion {
    type Error = VaultError;

    fn try_from(value: String) -> Result<Self> {
        ScreenVersion::parse(&value)
    }
}

impl From<ScreenVersion> for String {
    fn from(version: ScreenVersion) -> Self {
        version.to_string()
    }
}

impl TryFrom<Version> for ScreenVersion {
    type Error = VaultError;

    fn try_from(version: Version) -> Result<Self> {
        if !version.pre.is_empty() || !version.build.is_empty() {
            return Err(VaultError::InvalidVersion(version.to_string()));
        }
        Ok(ScreenVersion(version))
    }
}
