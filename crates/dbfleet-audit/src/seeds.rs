//! Seed list of named clusters to audit.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::types::NodeAddress;

/// One address or a list of addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedHosts {
    /// A single address string.
    One(String),
    /// Several members of the same cluster.
    Many(Vec<String>),
}

impl Default for SeedHosts {
    fn default() -> Self {
        SeedHosts::Many(Vec::new())
    }
}

impl SeedHosts {
    /// Non-blank addresses in their given order.
    pub fn addresses(&self) -> Vec<NodeAddress> {
        let raw: Vec<&str> = match self {
            SeedHosts::One(h) => vec![h.as_str()],
            SeedHosts::Many(hs) => hs.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .filter(|h| !h.trim().is_empty())
            .map(NodeAddress::new)
            .collect()
    }
}

fn default_true() -> bool {
    true
}

/// A named cluster in the seed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEntry {
    /// Cluster label used as the report key.
    pub label: String,
    /// One address or several members of the same cluster.
    #[serde(default)]
    pub hosts: SeedHosts,
    /// Entries with `live = false` are skipped.
    #[serde(default)]
    pub live: bool,
    /// Probe routers named by the cluster; false probes only the seed router.
    #[serde(default = "default_true")]
    pub process_routers: bool,
}

impl SeedEntry {
    /// Entry over `hosts` that processes routers.
    pub fn new(label: &str, hosts: &[&str], live: bool) -> Self {
        Self {
            label: label.to_string(),
            hosts: SeedHosts::Many(hosts.iter().map(|h| h.to_string()).collect()),
            live,
            process_routers: true,
        }
    }

    /// Whether the coordinator audits this entry at all.
    pub fn is_auditable(&self) -> bool {
        self.live && !self.hosts.addresses().is_empty()
    }
}

/// Read-only source of seed entries.
pub trait SeedSource {
    /// Every entry in source order.
    fn load(&self) -> Result<Vec<SeedEntry>>;
}

#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    clusters: Vec<SeedEntry>,
}

/// Seed entries stored in a TOML (`[[clusters]]`) or JSON file.
#[derive(Debug, Clone)]
pub struct FileSeedSource {
    path: PathBuf,
}

impl FileSeedSource {
    /// Source reading `path`; TOML or JSON by extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the seed file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SeedSource for FileSeedSource {
    fn load(&self) -> Result<Vec<SeedEntry>> {
        let contents = std::fs::read_to_string(&self.path)?;
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let file: SeedFile = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                return Err(AuditError::Config(format!(
                    "unsupported seed file extension: {}",
                    ext
                )))
            }
        };
        Ok(file.clusters)
    }
}

impl SeedSource for Vec<SeedEntry> {
    fn load(&self) -> Result<Vec<SeedEntry>> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hosts_single_string() {
        let entry: SeedEntry =
            serde_json::from_str(r#"{"label": "c1", "hosts": "h1:27017", "live": true}"#).unwrap();
        assert_eq!(entry.hosts.addresses(), vec![NodeAddress::new("h1:27017")]);
        assert!(entry.process_routers);
        assert!(entry.is_auditable());
    }

    #[test]
    fn test_defaults() {
        let entry: SeedEntry = serde_json::from_str(r#"{"label": "c1"}"#).unwrap();
        assert!(!entry.live);
        assert!(entry.process_routers);
        assert!(entry.hosts.addresses().is_empty());
        assert!(!entry.is_auditable());
    }

    #[test]
    fn test_blank_hosts_not_auditable() {
        let entry = SeedEntry::new("c1", &["", "  "], true);
        assert!(!entry.is_auditable());
    }

    #[test]
    fn test_file_source_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
[[clusters]]
label = "orders"
hosts = ["mongos1:27017", "mongos2:27017"]
live = true
process_routers = false

[[clusters]]
label = "legacy"
hosts = "old:27017"
            "#
        )
        .unwrap();

        let entries = FileSeedSource::new(file.path()).load().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label, "orders");
        assert_eq!(entries[0].hosts.addresses().len(), 2);
        assert!(!entries[0].process_routers);
        assert!(!entries[1].live);
    }

    #[test]
    fn test_file_source_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{"clusters": [{{"label": "c1", "hosts": ["h1:27017"], "live": true}}]}}"#
        )
        .unwrap();
        let entries = FileSeedSource::new(file.path()).load().unwrap();
        assert_eq!(entries, vec![SeedEntry::new("c1", &["h1:27017"], true)]);
    }

    #[test]
    fn test_file_source_missing_file() {
        let source = FileSeedSource::new("/nonexistent/seeds.toml");
        assert!(matches!(source.load(), Err(AuditError::Io(_))));
    }
}
