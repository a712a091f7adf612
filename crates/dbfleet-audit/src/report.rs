//! Per-cluster results and the fleet-wide report handed to rendering.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::ShardingCatalog;
use crate::consistency::{IndexDivergence, ReferenceSchema};
use crate::error::{ProbeFailure, Result};
use crate::topology::TopologyGap;
use crate::types::{NodeRole, NodeSnapshot};

/// A snapshot together with its version verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbedNode {
    /// What the probe observed.
    pub snapshot: NodeSnapshot,
    /// Version is at or above the audit minimum.
    pub valid: bool,
}

/// Outcome of auditing one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAuditResult {
    /// Cluster label from the seed list.
    pub label: String,
    /// Snapshots grouped by role, in probe order.
    pub nodes: BTreeMap<NodeRole, Vec<ProbedNode>>,
    /// Addresses that were attempted and did not yield a snapshot.
    pub errors: Vec<ProbeFailure>,
    /// Discovery steps that failed; non-empty means the audit is incomplete.
    #[serde(default)]
    pub gaps: Vec<TopologyGap>,
    /// Per-cluster reference index schema.
    pub reference: ReferenceSchema,
    /// Per-node differences from the reference, after the final comparison.
    #[serde(default)]
    pub divergences: Vec<IndexDivergence>,
    /// Partitioned databases and shard keys; empty for unsharded clusters.
    #[serde(default)]
    pub sharding: ShardingCatalog,
}

impl ClusterAuditResult {
    /// Empty result for the cluster `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            nodes: BTreeMap::new(),
            errors: Vec::new(),
            gaps: Vec::new(),
            reference: ReferenceSchema::new(),
            divergences: Vec::new(),
            sharding: ShardingCatalog::default(),
        }
    }

    /// Snapshots of one role, in probe order.
    pub fn snapshots(&self, role: NodeRole) -> &[ProbedNode] {
        self.nodes.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of snapshots across all roles.
    pub fn node_count(&self) -> usize {
        self.nodes.values().map(Vec::len).sum()
    }

    /// True when discovery reached every node it could name.
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }

    /// True when no divergence was found.
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }

    /// Nodes whose version is below the audit minimum.
    pub fn below_minimum(&self) -> impl Iterator<Item = &ProbedNode> {
        self.nodes.values().flatten().filter(|n| !n.valid)
    }

    /// True when every node is valid and consistent and nothing failed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self.is_complete()
            && self.is_consistent()
            && self.below_minimum().next().is_none()
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} config, {} data, {} router | {} below minimum | {} divergences | {} errors{}",
            self.label,
            self.snapshots(NodeRole::Config).len(),
            self.snapshots(NodeRole::Data).len(),
            self.snapshots(NodeRole::Router).len(),
            self.below_minimum().count(),
            self.divergences.len(),
            self.errors.len(),
            if self.is_complete() { "" } else { " | INCOMPLETE" }
        )
    }
}

/// Fleet-wide audit report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetAuditReport {
    /// Minimum version the fleet was audited against.
    pub minimum_version: String,
    /// When the report was created.
    pub generated_at: DateTime<Utc>,
    /// Cluster label to result, ascending by label.
    pub results: BTreeMap<String, ClusterAuditResult>,
}

impl FleetAuditReport {
    /// Empty report stamped with the current time.
    pub fn new(minimum_version: impl Into<String>) -> Self {
        Self {
            minimum_version: minimum_version.into(),
            generated_at: Utc::now(),
            results: BTreeMap::new(),
        }
    }

    /// Inserts a cluster result; a result with the same label is replaced.
    pub fn insert(&mut self, result: ClusterAuditResult) {
        self.results.insert(result.label.clone(), result);
    }

    /// Result for one cluster label.
    pub fn cluster(&self, label: &str) -> Option<&ClusterAuditResult> {
        self.results.get(label)
    }

    /// Results in label order.
    pub fn clusters(&self) -> impl Iterator<Item = &ClusterAuditResult> {
        self.results.values()
    }

    /// True when every cluster is clean.
    pub fn is_clean(&self) -> bool {
        self.results.values().all(ClusterAuditResult::is_clean)
    }

    /// (cluster label, node) for every node below the minimum version.
    pub fn nodes_below_minimum(&self) -> Vec<(&str, &ProbedNode)> {
        self.results
            .values()
            .flat_map(|c| c.below_minimum().map(move |n| (c.label.as_str(), n)))
            .collect()
    }

    /// Writes the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Reads a report written by [`FleetAuditReport::write_json`].
    pub fn read_json(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
