//! Per-cluster traversal: resolve each seed into a plan, then execute it.
//!
//! Every snapshot is folded into the cluster's [`ClusterAudit`] context as
//! soon as it is taken. Per-node, per-shard and per-router failures become
//! error entries and never stop the remaining probes.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FailureKind, ProbeFailure};
use crate::failover::FailoverResolver;
use crate::probe::NodeProbe;
use crate::report::{ClusterAuditResult, ProbedNode};
use crate::topology::{TopologyGap, TopologyPlan, TopologyResolver};
use crate::types::{NodeAddress, NodeRole, NodeSnapshot};
use crate::version::VersionGate;

/// Mutable state of one cluster audit. Never shared between clusters.
pub struct ClusterAudit<'a> {
    gate: &'a VersionGate,
    result: ClusterAuditResult,
    visited: HashSet<NodeAddress>,
    skipped: usize,
}

impl<'a> ClusterAudit<'a> {
    /// Empty audit for cluster `label`.
    pub fn new(label: &str, gate: &'a VersionGate) -> Self {
        Self {
            gate,
            result: ClusterAuditResult::new(label),
            visited: HashSet::new(),
            skipped: 0,
        }
    }

    /// Marks `address` as attempted. Returns false if it already was.
    pub fn claim(&mut self, address: &NodeAddress) -> bool {
        self.visited.insert(address.clone())
    }

    /// True once `address` is visited in this cluster.
    pub fn is_claimed(&self, address: &NodeAddress) -> bool {
        self.visited.contains(address)
    }

    /// Applies the version gate and, for data-bearing nodes, the
    /// consistency check, then stores the snapshot.
    pub fn record_snapshot(&mut self, snapshot: NodeSnapshot) {
        let valid = match self.gate.check(&snapshot.version) {
            Ok(valid) => valid,
            Err(e) => {
                self.record_failure(ProbeFailure::from_error(snapshot.address.clone(), &e));
                return;
            }
        };
        if snapshot.role.is_data_bearing() {
            let divergences = self.result.reference.observe(&snapshot);
            if !divergences.is_empty() {
                debug!(
                    address = %snapshot.address,
                    count = divergences.len(),
                    "index catalog diverges from reference"
                );
            }
        }
        if !valid {
            warn!(
                address = %snapshot.address,
                version = %snapshot.version,
                minimum = %self.gate.minimum(),
                "node below minimum version"
            );
        }
        self.result
            .nodes
            .entry(snapshot.role)
            .or_default()
            .push(ProbedNode { snapshot, valid });
    }

    /// Records an address that yielded no snapshot.
    pub fn record_failure(&mut self, failure: ProbeFailure) {
        warn!(cluster = %self.result.label, %failure, "node error");
        self.result.errors.push(failure);
    }

    /// Records a discovery step that could not complete.
    pub fn record_gap(&mut self, gap: TopologyGap) {
        self.result.gaps.push(gap);
    }

    /// Freezes the audit. Every data-bearing snapshot is compared once more
    /// against the final reference so detection does not depend on visit order.
    pub fn finish(mut self) -> ClusterAuditResult {
        let divergences: Vec<_> = self
            .result
            .snapshots(NodeRole::Data)
            .iter()
            .flat_map(|n| self.result.reference.compare(&n.snapshot))
            .collect();
        self.result.divergences = divergences;
        self.result
    }
}

/// Drives topology resolution and probing for one cluster at a time.
pub struct TraversalEngine {
    probe: NodeProbe,
    gate: VersionGate,
    config_server_port: u16,
    cancel: CancellationToken,
}

impl TraversalEngine {
    /// Engine applying `gate` to every snapshot.
    pub fn new(probe: NodeProbe, gate: VersionGate, config_server_port: u16) -> Self {
        Self {
            probe,
            gate,
            config_server_port,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` to stop probing at the next node boundary.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Version gate applied to snapshots.
    pub fn gate(&self) -> &VersionGate {
        &self.gate
    }

    /// Audits one cluster from its seed list.
    pub async fn traverse(
        &self,
        label: &str,
        seeds: &[NodeAddress],
        skip_routers: bool,
    ) -> ClusterAuditResult {
        info!(cluster = %label, seeds = seeds.len(), "auditing cluster");
        let mut audit = ClusterAudit::new(label, &self.gate);
        let resolver = TopologyResolver::new(&self.probe, self.config_server_port);

        for seed in seeds {
            if self.cancel.is_cancelled() {
                audit.record_gap(cancelled_gap(seed));
                break;
            }
            if audit.is_claimed(seed) {
                debug!(%seed, "seed already covered by an earlier seed");
                continue;
            }
            match resolver.resolve(seed).await {
                Ok(plan) => self.execute(&plan, skip_routers, &mut audit).await,
                Err(failure) => {
                    audit.claim(seed);
                    audit.record_failure(failure);
                }
            }
            if audit.skipped > 0 {
                audit.record_gap(cancelled_gap(seed));
                break;
            }
        }

        let result = audit.finish();
        info!(summary = %result.summary(), "cluster audit complete");
        result
    }

    /// Probes every address named by `plan` into `audit`.
    pub async fn execute(&self, plan: &TopologyPlan, skip_routers: bool, audit: &mut ClusterAudit<'_>) {
        match plan {
            TopologyPlan::Simple { members, .. } => {
                for member in members {
                    self.probe_once(member, None, audit).await;
                }
            }
            TopologyPlan::Sharded {
                router,
                config_servers,
                routers,
                shards,
                catalog,
                gaps,
            } => {
                for gap in gaps {
                    audit.record_gap(gap.clone());
                }
                audit.result.sharding.merge(catalog);

                info!(%router, count = config_servers.len(), "probing config servers");
                for server in config_servers {
                    self.probe_once(server, Some(NodeRole::Config), audit).await;
                }

                if skip_routers {
                    info!(%router, "skipping router probing");
                } else {
                    info!(%router, count = routers.len(), "probing routers");
                    for r in routers {
                        self.probe_once(r, None, audit).await;
                    }
                }

                info!(%router, count = shards.len(), "probing shards");
                let failover = FailoverResolver::new(&self.probe);
                for shard in shards {
                    if self.cancel.is_cancelled() {
                        audit.skipped += 1;
                        break;
                    }
                    match failover.resolve_membership(&shard.hosts).await {
                        Ok(members) => {
                            debug!(shard = %shard.label(), members = members.len(), "probing shard");
                            for member in &members {
                                self.probe_once(member, None, audit).await;
                            }
                        }
                        Err(failure) => {
                            warn!(shard = %shard.label(), "no shard member reported membership");
                            let free = failure
                                .last_candidate_where(|c| !audit.is_claimed(c))
                                .cloned();
                            match free {
                                Some(address) => {
                                    audit.claim(&address);
                                    audit.record_failure(failure.failure_at(address));
                                }
                                // every candidate already has its own entry
                                None => audit.record_gap(TopologyGap {
                                    seed: router.clone(),
                                    kind: FailureKind::MembershipResolutionFailure,
                                    reason: format!("shard {}: {}", shard.label(), failure.reason()),
                                }),
                            }
                        }
                    }
                }
            }
        }
    }

    async fn probe_once(&self, address: &NodeAddress, role: Option<NodeRole>, audit: &mut ClusterAudit<'_>) {
        if self.cancel.is_cancelled() {
            audit.skipped += 1;
            return;
        }
        if !audit.claim(address) {
            debug!(%address, "already probed in this cluster audit");
            return;
        }
        match self.probe.probe(address, role).await {
            Ok(snapshot) => audit.record_snapshot(snapshot),
            Err(failure) => audit.record_failure(failure),
        }
    }
}

fn cancelled_gap(seed: &NodeAddress) -> TopologyGap {
    TopologyGap {
        seed: seed.clone(),
        kind: FailureKind::Cancelled,
        reason: "audit cancelled before traversal completed".to_string(),
    }
}
