//! Fleet-wide audit over a seed list.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command::Connector;
use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::probe::{NodeProbe, ProbeSettings};
use crate::report::{ClusterAuditResult, FleetAuditReport};
use crate::seeds::SeedEntry;
use crate::traversal::TraversalEngine;
use crate::version::VersionGate;

/// Audits every seed entry and assembles the fleet report.
pub struct AuditCoordinator {
    engine: TraversalEngine,
    minimum_version: String,
    max_concurrent_clusters: usize,
}

impl AuditCoordinator {
    /// Coordinator over a ready traversal engine.
    pub fn new(engine: TraversalEngine, minimum_version: &str, max_concurrent_clusters: usize) -> Self {
        Self {
            engine,
            minimum_version: minimum_version.to_string(),
            max_concurrent_clusters: max_concurrent_clusters.max(1),
        }
    }

    /// Builds the probe, gate and traversal engine described by `config`.
    pub fn from_config(
        connector: Arc<dyn Connector>,
        config: &AuditConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let gate = VersionGate::new(&config.minimum_version).map_err(|_| {
            AuditError::Config(format!(
                "invalid minimum version '{}'",
                config.minimum_version
            ))
        })?;
        let probe = NodeProbe::new(connector, ProbeSettings::from(config));
        let engine = TraversalEngine::new(probe, gate, config.config_server_port)
            .with_cancellation(cancel);
        Ok(Self::new(
            engine,
            &config.minimum_version,
            config.max_concurrent_clusters,
        ))
    }

    /// Entries that will be audited, in audit order: sorted by liveness then
    /// label, with non-live and host-less entries dropped.
    pub fn audit_order(entries: &[SeedEntry]) -> Vec<&SeedEntry> {
        let mut ordered: Vec<&SeedEntry> = entries.iter().collect();
        ordered.sort_by(|a, b| (a.live, &a.label).cmp(&(b.live, &b.label)));
        ordered
            .into_iter()
            .filter(|entry| {
                if !entry.live {
                    warn!(cluster = %entry.label, "skipping cluster that is not live");
                    false
                } else if entry.hosts.addresses().is_empty() {
                    warn!(cluster = %entry.label, "skipping cluster without hosts");
                    false
                } else {
                    true
                }
            })
            .collect()
    }

    /// Audits every live entry and assembles the fleet report.
    ///
    /// Results are inserted in audit order, so a repeated label keeps the
    /// last entry's result.
    pub async fn run_audit(&self, entries: &[SeedEntry]) -> FleetAuditReport {
        let ordered = Self::audit_order(entries);
        info!(
            clusters = ordered.len(),
            concurrency = self.max_concurrent_clusters,
            minimum_version = %self.minimum_version,
            "starting fleet audit"
        );

        let results: Vec<ClusterAuditResult> = stream::iter(ordered.into_iter().map(|entry| {
            let seeds = entry.hosts.addresses();
            async move {
                self.engine
                    .traverse(&entry.label, &seeds, !entry.process_routers)
                    .await
            }
        }))
        .buffered(self.max_concurrent_clusters)
        .collect()
        .await;

        let mut report = FleetAuditReport::new(self.minimum_version.clone());
        for result in results {
            report.insert(result);
        }
        info!(clusters = report.results.len(), "fleet audit complete");
        report
    }
}
