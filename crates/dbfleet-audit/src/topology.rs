//! Seed classification and expansion into a traversal plan.
//!
//! A seed is probed once. Data-bearing seeds produce a [`TopologyPlan::Simple`]
//! over their replica set membership; routers produce a
//! [`TopologyPlan::Sharded`] naming config servers, registered routers and
//! the candidate hosts of every shard. The plan is pure data so that it can
//! be inspected and executed independently of discovery.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::{NodeCommands, ProcessKind, ShardingCatalog};
use crate::error::{AuditError, FailureKind, ProbeFailure};
use crate::probe::NodeProbe;
use crate::types::NodeAddress;

/// A shard as registered with the cluster: `[replicaSetName/]host1,host2,...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSpec {
    /// Replica set name, `None` for a bare host list.
    pub replica_set: Option<String>,
    /// Member hosts in listed order.
    pub hosts: Vec<NodeAddress>,
}

impl ShardSpec {
    /// Parses a replica set string. Returns `None` when no host is named.
    pub fn parse(spec: &str) -> Option<Self> {
        let (replica_set, hosts) = match spec.trim().rsplit_once('/') {
            Some((name, hosts)) if !name.trim().is_empty() => {
                (Some(name.trim().to_string()), hosts)
            }
            Some((_, hosts)) => (None, hosts),
            None => (None, spec),
        };
        let hosts: Vec<NodeAddress> = hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(NodeAddress::new)
            .collect();
        if hosts.is_empty() {
            None
        } else {
            Some(Self { replica_set, hosts })
        }
    }

    /// Label used in logs: the replica set name or the joined host list.
    pub fn label(&self) -> String {
        match &self.replica_set {
            Some(name) => name.clone(),
            None => self
                .hosts
                .iter()
                .map(|h| h.as_str())
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Parses a router's config server string, defaulting missing ports.
pub fn parse_config_servers(spec: &str, default_port: u16) -> Option<Vec<NodeAddress>> {
    ShardSpec::parse(spec).map(|s| {
        s.hosts
            .into_iter()
            .map(|h| h.with_default_port(default_port))
            .collect()
    })
}

/// Part of a sharded topology that could not be discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyGap {
    /// Seed whose expansion was incomplete.
    pub seed: NodeAddress,
    /// Failure class of the step.
    pub kind: FailureKind,
    /// What went wrong.
    pub reason: String,
}

/// Addresses that must be probed for one seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyPlan {
    /// Standalone node or replica set: probe every member directly.
    Simple {
        /// Address the plan was resolved from.
        seed: NodeAddress,
        /// Members to probe; just the seed when membership is unknown.
        members: Vec<NodeAddress>,
    },
    /// Sharded cluster discovered through a router.
    Sharded {
        /// Router the plan was resolved from.
        router: NodeAddress,
        /// Config servers with the default port applied.
        config_servers: Vec<NodeAddress>,
        /// Routers registered with the cluster, as the seed reports them.
        routers: Vec<NodeAddress>,
        /// Shards in registry order.
        shards: Vec<ShardSpec>,
        /// Partitioned databases and shard keys as reported by the router.
        catalog: ShardingCatalog,
        /// Discovery steps that failed; the rest of the plan is still valid.
        gaps: Vec<TopologyGap>,
    },
}

impl TopologyPlan {
    /// Number of addresses named by the plan before failover trimming.
    pub fn planned_address_count(&self) -> usize {
        match self {
            TopologyPlan::Simple { members, .. } => members.len(),
            TopologyPlan::Sharded {
                config_servers,
                routers,
                shards,
                ..
            } => {
                config_servers.len()
                    + routers.len()
                    + shards.iter().map(|s| s.hosts.len()).sum::<usize>()
            }
        }
    }

    /// True for plans discovered through a router.
    pub fn is_sharded(&self) -> bool {
        matches!(self, TopologyPlan::Sharded { .. })
    }
}

/// Classifies seeds and expands them into plans.
pub struct TopologyResolver<'a> {
    probe: &'a NodeProbe,
    config_server_port: u16,
}

impl<'a> TopologyResolver<'a> {
    /// Resolver probing through `probe`.
    pub fn new(probe: &'a NodeProbe, config_server_port: u16) -> Self {
        Self {
            probe,
            config_server_port,
        }
    }

    /// Probes `seed` once and builds its plan.
    ///
    /// Fails only when the seed itself cannot be classified.
    pub async fn resolve(&self, seed: &NodeAddress) -> Result<TopologyPlan, ProbeFailure> {
        let (session, status) = self
            .probe
            .open(seed)
            .await
            .map_err(|e| ProbeFailure::from_error(seed.clone(), &e))?;

        match status.process {
            ProcessKind::Data => {
                let peers = self
                    .probe
                    .with_deadline(seed, session.peer_config())
                    .await
                    .map_err(|e| ProbeFailure::from_error(seed.clone(), &e))?;
                let members = if peers.is_empty() {
                    vec![seed.clone()]
                } else {
                    peers
                };
                info!(%seed, members = members.len(), "seed is a data node");
                Ok(TopologyPlan::Simple {
                    seed: seed.clone(),
                    members,
                })
            }
            ProcessKind::Router => {
                info!(%seed, "seed is a router, expanding sharded topology");
                Ok(self.expand_sharded(seed, session.as_ref()).await)
            }
        }
    }

    async fn expand_sharded(&self, router: &NodeAddress, session: &dyn NodeCommands) -> TopologyPlan {
        let mut gaps = Vec::new();
        let mut gap = |kind: FailureKind, reason: String| {
            warn!(seed = %router, %kind, %reason, "sharded topology incomplete");
            gaps.push(TopologyGap {
                seed: router.clone(),
                kind,
                reason,
            });
        };

        let config_servers = match self.probe.with_deadline(router, session.router_config()).await {
            Ok(spec) => match parse_config_servers(&spec, self.config_server_port) {
                Some(servers) => servers,
                None => {
                    let err = AuditError::TopologyExpansionFailure {
                        address: router.to_string(),
                        msg: format!("unparsable config server string '{}'", spec),
                    };
                    gap(err.kind(), err.to_string());
                    Vec::new()
                }
            },
            Err(e) => {
                gap(
                    FailureKind::TopologyExpansionFailure,
                    format!("cannot read config server string: {}", e),
                );
                Vec::new()
            }
        };

        let routers = match self
            .probe
            .with_deadline(router, session.router_registrations())
            .await
        {
            Ok(routers) => routers,
            Err(e) => {
                gap(
                    FailureKind::TopologyExpansionFailure,
                    format!("cannot list routers: {}", e),
                );
                Vec::new()
            }
        };

        let shards = match self
            .probe
            .with_deadline(router, session.shard_registrations())
            .await
        {
            Ok(specs) => {
                let mut shards = Vec::with_capacity(specs.len());
                for spec in specs {
                    match ShardSpec::parse(&spec) {
                        Some(shard) => shards.push(shard),
                        None => gap(
                            FailureKind::TopologyExpansionFailure,
                            format!("unparsable shard string '{}'", spec),
                        ),
                    }
                }
                shards
            }
            Err(e) => {
                gap(
                    FailureKind::TopologyExpansionFailure,
                    format!("cannot list shards: {}", e),
                );
                Vec::new()
            }
        };

        let catalog = match self
            .probe
            .with_deadline(router, session.sharding_catalog())
            .await
        {
            Ok(catalog) => catalog,
            Err(e) => {
                gap(
                    FailureKind::TopologyExpansionFailure,
                    format!("cannot read sharding catalog: {}", e),
                );
                ShardingCatalog::default()
            }
        };

        TopologyPlan::Sharded {
            router: router.clone(),
            config_servers,
            routers,
            shards,
            catalog,
            gaps,
        }
    }
}
