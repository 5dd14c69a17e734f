//! Version identifiers
//!
//! A version is an opaque identifier such as `8.5.4`, `2023a` or `R2023b-rev1`.
//! Equality is exact string equality; ordering is numeric-aware so listings
//! come out in release order.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::ManagerError;

/// Character class a version may be built from, shared with the catalog scanner
pub(crate) const VERSION_CHARS: &str = r"R?[0-9][0-9A-Za-z.\-]*?";

static VERSION_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^R?([0-9]+(?:\.[0-9]+)*)([a-z]?)(?:-rev([0-9]+))?$")
        .expect("version pattern is valid")
});

/// A validated version identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    numbers: Vec<u64>,
    letter: Option<char>,
    revision: u64,
}

impl Version {
    /// Parse and validate an identifier
    pub fn parse(s: &str) -> Result<Self, ManagerError> {
        if Self::sort_key(s).is_none() {
            return Err(ManagerError::InvalidVersion(s.to_string()));
        }
        Ok(Version(s.to_string()))
    }

    /// Whether `s` looks like a version (used when scanning directories)
    pub fn is_valid(s: &str) -> bool {
        Self::sort_key(s).is_some()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn sort_key(s: &str) -> Option<SortKey> {
        let caps = VERSION_RX.captures(s)?;
        let numbers = caps[1]
            .split('.')
            .map(|n| n.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        let letter = caps.get(2).and_then(|m| m.as_str().chars().next());
        let revision = match caps.get(3) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        Some(SortKey {
            numbers,
            letter,
            revision,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Both sides were validated on construction
        let a = Self::sort_key(&self.0);
        let b = Self::sort_key(&other.0);
        a.cmp(&b).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Version {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = ManagerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if Self::sort_key(&s).is_none() {
            return Err(ManagerError::InvalidVersion(s));
        }
        Ok(Version(s))
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.0
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
