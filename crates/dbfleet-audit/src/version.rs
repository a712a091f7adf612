//! Dotted numeric version parsing and the minimum-version gate.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{AuditError, Result};

/// A version such as `3.2.11`, compared component-wise as numbers.
///
/// Missing trailing components compare as zero, so `2.4` equals `2.4.0`.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
}

impl Version {
    /// Numeric components in order.
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    fn component(&self, idx: usize) -> u64 {
        self.components.get(idx).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let parse_err = || AuditError::VersionParseFailure {
            version: s.to_string(),
        };
        if trimmed.is_empty() {
            return Err(parse_err());
        }
        let components = trimmed
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(parse_err());
                }
                part.parse::<u64>().map_err(|_| parse_err())
            })
            .collect::<Result<Vec<u64>>>()?;
        Ok(Self { components })
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for idx in 0..len {
            match self.component(idx).cmp(&other.component(idx)) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Returns whether `version` is at or above `minimum`.
///
/// Either string failing to parse is an error, never a verdict.
pub fn is_valid(version: &str, minimum: &str) -> Result<bool> {
    let version: Version = version.parse()?;
    let minimum: Version = minimum.parse()?;
    Ok(version >= minimum)
}

/// Version gate bound to one pre-parsed minimum version.
#[derive(Debug, Clone)]
pub struct VersionGate {
    minimum: Version,
}

impl VersionGate {
    /// Gate with the given minimum; fails on an invalid version string.
    pub fn new(minimum: &str) -> Result<Self> {
        Ok(Self {
            minimum: minimum.parse()?,
        })
    }

    /// Minimum version of the gate.
    pub fn minimum(&self) -> &Version {
        &self.minimum
    }

    /// True when `version` is at or above the minimum.
    pub fn check(&self, version: &str) -> Result<bool> {
        let version: Version = version.parse()?;
        Ok(version >= self.minimum)
    }
}
