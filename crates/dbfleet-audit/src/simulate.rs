//! Canned report for exercising output paths without contacting any node.

use crate::consistency::ReferenceSchema;
use crate::error::{FailureKind, ProbeFailure};
use crate::report::{ClusterAuditResult, FleetAuditReport, ProbedNode};
use crate::topology::TopologyGap;
use crate::types::{IndexCatalog, IndexKeySpec, NodeAddress, NodeRole, NodeSnapshot};
use crate::version::is_valid;

fn snapshot(address: &str, role: NodeRole, version: &str, indexes: IndexCatalog) -> NodeSnapshot {
    NodeSnapshot {
        address: NodeAddress::new(address),
        role,
        version: version.to_string(),
        indexes,
    }
}

fn users_catalog(email_unique: bool) -> IndexCatalog {
    let mut catalog = IndexCatalog::new();
    let users = catalog.entry("shop.users".to_string()).or_default();
    users.insert("_id_".to_string(), IndexKeySpec::new().field("_id", 1));
    let email = if email_unique {
        IndexKeySpec::new().field("email", 1)
    } else {
        IndexKeySpec::new().field("email", -1)
    };
    users.insert("email_1".to_string(), email);
    let orders = catalog.entry("shop.orders".to_string()).or_default();
    orders.insert("_id_".to_string(), IndexKeySpec::new().field("_id", 1));
    orders.insert(
        "user_1_ts_-1".to_string(),
        IndexKeySpec::new().field("user", 1).field("ts", -1),
    );
    catalog
}

fn push(cluster: &mut ClusterAuditResult, minimum: &str, snapshot: NodeSnapshot) {
    let valid = is_valid(&snapshot.version, minimum).unwrap_or(false);
    if snapshot.role.is_data_bearing() {
        cluster.reference.observe(&snapshot);
    }
    cluster
        .nodes
        .entry(snapshot.role)
        .or_default()
        .push(ProbedNode { snapshot, valid });
}

fn finalize(mut cluster: ClusterAuditResult) -> ClusterAuditResult {
    let reference: &ReferenceSchema = &cluster.reference;
    let divergences: Vec<_> = cluster
        .snapshots(NodeRole::Data)
        .iter()
        .flat_map(|n| reference.compare(&n.snapshot))
        .collect();
    cluster.divergences = divergences;
    cluster
}

/// A fixed report with a sharded cluster (one divergent member, one node
/// below minimum, one unreachable shard and a topology gap) and a clean
/// replica set.
pub fn simulated_report(minimum_version: &str) -> FleetAuditReport {
    let mut sharded = ClusterAuditResult::new("sim-sharded");
    push(
        &mut sharded,
        minimum_version,
        snapshot("cfg1.sim:27019", NodeRole::Config, "3.4.10", IndexCatalog::new()),
    );
    push(
        &mut sharded,
        minimum_version,
        snapshot("mongos1.sim:27017", NodeRole::Router, "3.4.10", IndexCatalog::new()),
    );
    push(
        &mut sharded,
        minimum_version,
        snapshot("mongos2.sim:27017", NodeRole::Router, "1.8.5", IndexCatalog::new()),
    );
    push(
        &mut sharded,
        minimum_version,
        snapshot("shard0a.sim:27018", NodeRole::Data, "3.4.10", users_catalog(true)),
    );
    push(
        &mut sharded,
        minimum_version,
        snapshot("shard0b.sim:27018", NodeRole::Data, "3.4.10", users_catalog(false)),
    );
    sharded.errors.push(ProbeFailure::new(
        NodeAddress::new("shard1b.sim:27018"),
        FailureKind::MembershipResolutionFailure,
        "membership resolution failed for candidates [shard1a.sim:27018,shard1b.sim:27018]",
    ));
    sharded.gaps.push(TopologyGap {
        seed: NodeAddress::new("mongos1.sim:27017"),
        kind: FailureKind::TopologyExpansionFailure,
        reason: "unparsable shard string ''".to_string(),
    });

    sharded.sharding.partitioned.insert("shop".to_string());
    sharded.sharding.shard_keys.insert(
        "shop.orders".to_string(),
        IndexKeySpec::new().field("user", "hashed"),
    );

    let mut replica = ClusterAuditResult::new("sim-replica");
    for member in ["rs-a.sim:27017", "rs-b.sim:27017", "rs-c.sim:27017"] {
        push(
            &mut replica,
            minimum_version,
            snapshot(member, NodeRole::Data, "3.2.22", users_catalog(true)),
        );
    }

    let mut report = FleetAuditReport::new(minimum_version);
    report.insert(finalize(sharded));
    report.insert(finalize(replica));
    report
}
