//! Audit settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AuditError, Result};
use crate::version::Version;

/// Audit settings loaded from TOML or JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Dotted minimum version every node must meet.
    pub minimum_version: String,
    /// Connect timeout per node in milliseconds.
    pub connect_timeout_ms: u64,
    /// Overall per-node deadline in milliseconds.
    pub node_deadline_ms: u64,
    /// Port appended to config server addresses that carry none.
    pub config_server_port: u16,
    /// Databases whose indexes are never collected.
    pub excluded_databases: Vec<String>,
    /// Skip databases the node reports as empty.
    pub skip_empty_databases: bool,
    /// Upper bound on clusters audited concurrently.
    pub max_concurrent_clusters: usize,
    /// Seed list file.
    pub seeds_path: Option<PathBuf>,
    /// Output prefix for the report files.
    pub output_file: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            minimum_version: String::from("2.0.0"),
            connect_timeout_ms: 5000,
            node_deadline_ms: 30_000,
            config_server_port: 27019,
            excluded_databases: ["local", "admin", "config", "test"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            skip_empty_databases: true,
            max_concurrent_clusters: 1,
            seeds_path: None,
            output_file: String::from("fleet_audit"),
        }
    }
}

impl AuditConfig {
    /// Loads settings from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: AuditConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                return Err(AuditError::Config(format!(
                    "unsupported config file extension: {}",
                    ext
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.minimum_version.parse::<Version>().map_err(|_| {
            AuditError::Config(format!(
                "minimum version '{}' is not dotted numeric",
                self.minimum_version
            ))
        })?;
        if self.max_concurrent_clusters == 0 {
            return Err(AuditError::Config(
                "max_concurrent_clusters must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.node_deadline_ms == 0 {
            return Err(AuditError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    /// `connect_timeout_ms` as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `node_deadline_ms` as a duration.
    pub fn node_deadline(&self) -> Duration {
        Duration::from_millis(self.node_deadline_ms)
    }

    /// True for databases listed in `excluded_databases`.
    pub fn is_excluded_database(&self, name: &str) -> bool {
        self.excluded_databases.iter().any(|db| db == name)
    }
}
