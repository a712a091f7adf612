//! End-to-end audits over in-memory fleets.
//!
//! These tests drive the coordinator and traversal engine through the fixture
//! connector and check the assembled report.

mod common;

use std::sync::Arc;

use common::{cancelling_coordinator, coordinator, id_index, sharded_fleet};
use dbfleet_audit::command::MemberState;
use dbfleet_audit::consistency::DivergenceKind;
use dbfleet_audit::export::{catalog_rows, UNSHARDED};
use dbfleet_audit::{
    AuditConfig, FailureKind, FixtureConnector, FixtureNode, FleetAuditReport, NodeProbe,
    IndexKeySpec, NodeRole, ProbeSettings, SeedEntry, TopologyResolver,
};
use tempfile::tempdir;

fn addresses(nodes: &[dbfleet_audit::ProbedNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.snapshot.address.as_str()).collect()
}

#[tokio::test]
async fn test_standalone_end_to_end() {
    let fleet = dbfleet_audit::FixtureFleet::new().node(
        "h1",
        FixtureNode::data("2.4.3").with_index("db.coll", "_id_", id_index()),
    );
    let (coordinator, _) = coordinator(fleet, &AuditConfig::default());

    let report = coordinator
        .run_audit(&[SeedEntry::new("c1", &["h1"], true)])
        .await;

    assert_eq!(report.results.len(), 1);
    let c1 = report.cluster("c1").unwrap();
    let data = c1.snapshots(NodeRole::Data);
    assert_eq!(data.len(), 1);
    assert!(data[0].valid);
    assert!(c1.errors.is_empty());
    assert_eq!(c1.node_count(), 1);

    let ns = c1.reference.get("db.coll").unwrap();
    assert_eq!(ns.index_count, 1);
    assert_eq!(ns.indexes.get("_id_"), Some(&id_index()));
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_sharded_cluster_full_audit() {
    let (coordinator, _) = coordinator(sharded_fleet(), &AuditConfig::default());
    let report = coordinator
        .run_audit(&[SeedEntry::new("orders", &["mongos1:27017"], true)])
        .await;

    let orders = report.cluster("orders").unwrap();
    assert_eq!(addresses(orders.snapshots(NodeRole::Config)), vec!["cfg1:27019"]);
    assert_eq!(
        addresses(orders.snapshots(NodeRole::Router)),
        vec!["mongos1:27017", "mongos2:27017"]
    );
    assert_eq!(
        addresses(orders.snapshots(NodeRole::Data)),
        vec!["rs0a:27018", "rs0b:27018", "rs1a:27018", "rs1b:27018"]
    );
    assert!(orders.errors.is_empty());
    assert!(orders.is_complete());
    assert!(orders.is_consistent());

    // config servers never contribute to the reference schema
    assert_eq!(orders.snapshots(NodeRole::Config)[0].snapshot.index_count(), 0);
    assert_eq!(orders.reference.get("app.users").unwrap().index_count, 2);
}

#[tokio::test]
async fn test_skip_routers() {
    let (coordinator, connector) = coordinator(sharded_fleet(), &AuditConfig::default());
    let mut entry = SeedEntry::new("orders", &["mongos1:27017"], true);
    entry.process_routers = false;

    let report = coordinator.run_audit(&[entry]).await;
    let orders = report.cluster("orders").unwrap();
    assert!(orders.snapshots(NodeRole::Router).is_empty());
    assert_eq!(orders.snapshots(NodeRole::Data).len(), 4);
    assert_eq!(connector.contact_count("mongos2:27017"), 0);
}

#[tokio::test]
async fn test_unreachable_shard_isolated() {
    let fleet = sharded_fleet()
        .node("rs1a:27018", FixtureNode::unreachable())
        .node("rs1b:27018", FixtureNode::unreachable());
    let (coordinator, _) = coordinator(fleet, &AuditConfig::default());

    let report = coordinator
        .run_audit(&[SeedEntry::new("orders", &["mongos1:27017"], true)])
        .await;
    let orders = report.cluster("orders").unwrap();

    assert_eq!(
        addresses(orders.snapshots(NodeRole::Data)),
        vec!["rs0a:27018", "rs0b:27018"]
    );
    assert_eq!(orders.errors.len(), 1);
    let error = &orders.errors[0];
    assert_eq!(error.kind, FailureKind::MembershipResolutionFailure);
    assert_eq!(error.address.as_str(), "rs1b:27018");
    assert!(error.reason.contains("rs1a:27018"));
}

#[tokio::test]
async fn test_router_and_config_failures_isolated() {
    let fleet = sharded_fleet()
        .node("mongos2:27017", FixtureNode::unreachable())
        .node("cfg1:27019", FixtureNode::unreachable());
    let (coordinator, _) = coordinator(fleet, &AuditConfig::default());

    let report = coordinator
        .run_audit(&[SeedEntry::new("orders", &["mongos1:27017"], true)])
        .await;
    let orders = report.cluster("orders").unwrap();

    let failed: Vec<&str> = orders.errors.iter().map(|e| e.address.as_str()).collect();
    assert_eq!(failed, vec!["cfg1:27019", "mongos2:27017"]);
    assert!(orders
        .errors
        .iter()
        .all(|e| e.kind == FailureKind::ConnectFailure));
    assert_eq!(orders.snapshots(NodeRole::Router).len(), 1);
    assert_eq!(orders.snapshots(NodeRole::Data).len(), 4);
}

#[tokio::test]
async fn test_failover_stops_at_first_success() {
    let fleet = dbfleet_audit::FixtureFleet::new()
        .node(
            "mongos1:27017",
            FixtureNode::router("3.4.2", "cfg1:27019").with_shards(&["rsX/x:27018,y:27018,z:27018"]),
        )
        .node("cfg1:27019", FixtureNode::data("3.4.2"))
        .node("x:27018", FixtureNode::unreachable())
        .node("y:27018", FixtureNode::data("3.4.2"))
        .node("z:27018", FixtureNode::data("3.4.2"));
    let (coordinator, connector) = coordinator(fleet, &AuditConfig::default());

    let report = coordinator
        .run_audit(&[SeedEntry::new("c", &["mongos1:27017"], true)])
        .await;
    let c = report.cluster("c").unwrap();

    assert_eq!(connector.contact_count("z:27018"), 0);
    assert_eq!(addresses(c.snapshots(NodeRole::Data)), vec!["y:27018"]);
}

#[tokio::test]
async fn test_divergent_shard_member_reported() {
    let rs1 = ["rs1a:27018", "rs1b:27018"];
    let fleet = sharded_fleet().node(
        "rs1b:27018",
        FixtureNode::data("3.4.2")
            .member_of(MemberState::Secondary, &rs1)
            .with_index("app.users", "_id_", id_index()),
    );
    let (coordinator, _) = coordinator(fleet, &AuditConfig::default());

    let report = coordinator
        .run_audit(&[SeedEntry::new("orders", &["mongos1:27017"], true)])
        .await;
    let orders = report.cluster("orders").unwrap();

    assert_eq!(orders.divergences.len(), 1);
    let divergence = &orders.divergences[0];
    assert_eq!(divergence.address.as_str(), "rs1b:27018");
    assert_eq!(divergence.index_name, "email_1");
    assert_eq!(divergence.kind, DivergenceKind::MissingOnNode);
    assert!(!report.is_clean());
}

#[tokio::test]
async fn test_second_seed_in_same_cluster_not_reprobed() {
    let (coordinator, _) = coordinator(sharded_fleet(), &AuditConfig::default());
    let report = coordinator
        .run_audit(&[SeedEntry::new(
            "orders",
            &["mongos1:27017", "rs0a:27018"],
            true,
        )])
        .await;
    let orders = report.cluster("orders").unwrap();
    assert_eq!(orders.snapshots(NodeRole::Data).len(), 4);
    assert_eq!(orders.snapshots(NodeRole::Router).len(), 2);
}

#[tokio::test]
async fn test_below_minimum_flagged_not_dropped() {
    let config = AuditConfig {
        minimum_version: "3.6".to_string(),
        ..AuditConfig::default()
    };
    let (coordinator, _) = coordinator(sharded_fleet(), &config);

    let report = coordinator
        .run_audit(&[SeedEntry::new("orders", &["mongos1:27017"], true)])
        .await;
    assert_eq!(report.minimum_version, "3.6");
    assert_eq!(report.nodes_below_minimum().len(), 7);
    assert_eq!(report.cluster("orders").unwrap().node_count(), 7);
}

#[tokio::test]
async fn test_router_plan_names_all_addresses() {
    let probe = NodeProbe::new(
        Arc::new(FixtureConnector::new(sharded_fleet())),
        ProbeSettings::default(),
    );
    let plan = TopologyResolver::new(&probe, 27019)
        .resolve(&"mongos1:27017".into())
        .await
        .unwrap();
    assert!(plan.is_sharded());
    assert!(plan.planned_address_count() >= 3);
}

#[tokio::test]
async fn test_report_json_file_round_trip() {
    let (coordinator, _) = coordinator(sharded_fleet(), &AuditConfig::default());
    let report = coordinator
        .run_audit(&[
            SeedEntry::new("orders", &["mongos1:27017"], true),
            SeedEntry::new("dark", &["gone:27017"], true),
        ])
        .await;

    let dir = tempdir().unwrap();
    let path = dir.path().join("fleet_audit.json");
    report.write_json(&path).unwrap();
    let loaded = FleetAuditReport::read_json(&path).unwrap();
    assert_eq!(loaded, report);
    assert_eq!(loaded.cluster("dark").unwrap().errors.len(), 1);
}

#[tokio::test]
async fn test_failed_shard_keyed_on_unclaimed_candidate() {
    let fleet = sharded_fleet()
        .node("rs1a:27018", FixtureNode::unreachable())
        .node("rs1b:27018", FixtureNode::unreachable());
    let (coordinator, _) = coordinator(fleet, &AuditConfig::default());

    // rs1b already failed as a seed before the router expands rs1
    let report = coordinator
        .run_audit(&[SeedEntry::new(
            "orders",
            &["rs1b:27018", "mongos1:27017"],
            true,
        )])
        .await;
    let orders = report.cluster("orders").unwrap();

    assert_eq!(orders.errors.len(), 2);
    assert_eq!(orders.errors[0].address.as_str(), "rs1b:27018");
    assert_eq!(orders.errors[0].kind, FailureKind::ConnectFailure);
    let shard = &orders.errors[1];
    assert_eq!(shard.address.as_str(), "rs1a:27018");
    assert_eq!(shard.kind, FailureKind::MembershipResolutionFailure);
    assert!(shard.reason.contains("rs1b:27018"));
    assert!(orders.is_complete());
    assert_eq!(orders.snapshots(NodeRole::Data).len(), 2);
}

#[tokio::test]
async fn test_failed_shard_with_all_candidates_claimed_is_gap() {
    let fleet = sharded_fleet()
        .node("rs1a:27018", FixtureNode::unreachable())
        .node("rs1b:27018", FixtureNode::unreachable());
    let (coordinator, _) = coordinator(fleet, &AuditConfig::default());

    let report = coordinator
        .run_audit(&[SeedEntry::new(
            "orders",
            &["rs1a:27018", "rs1b:27018", "mongos1:27017"],
            true,
        )])
        .await;
    let orders = report.cluster("orders").unwrap();

    let failed: Vec<&str> = orders.errors.iter().map(|e| e.address.as_str()).collect();
    assert_eq!(failed, vec!["rs1a:27018", "rs1b:27018"]);
    assert!(!orders.is_complete());
    assert_eq!(orders.gaps.len(), 1);
    assert_eq!(orders.gaps[0].kind, FailureKind::MembershipResolutionFailure);
    assert_eq!(orders.gaps[0].seed.as_str(), "mongos1:27017");
    assert!(orders.gaps[0].reason.contains("rs1"));
}

#[tokio::test]
async fn test_unparsable_router_metadata_is_incomplete_not_error() {
    let fleet = sharded_fleet().node(
        "mongos1:27017",
        FixtureNode::router("3.4.2", " , ")
            .with_routers(&["mongos1:27017"])
            .with_shards(&["rs0/rs0a:27018,rs0b:27018", ""]),
    );
    let (coordinator, connector) = coordinator(fleet, &AuditConfig::default());

    let report = coordinator
        .run_audit(&[SeedEntry::new("orders", &["mongos1:27017"], true)])
        .await;
    let orders = report.cluster("orders").unwrap();

    assert!(!orders.is_complete());
    assert!(orders.errors.is_empty());
    assert_eq!(orders.gaps.len(), 2);
    assert!(orders
        .gaps
        .iter()
        .all(|g| g.kind == FailureKind::TopologyExpansionFailure));
    assert_eq!(connector.contact_count("cfg1:27019"), 0);
    assert!(orders.snapshots(NodeRole::Config).is_empty());
    assert_eq!(
        addresses(orders.snapshots(NodeRole::Data)),
        vec!["rs0a:27018", "rs0b:27018"]
    );
    assert!(!report.is_clean());
}

#[tokio::test]
async fn test_cancel_between_shards_keeps_partial_result() {
    let (coordinator, connector) =
        cancelling_coordinator(sharded_fleet(), &AuditConfig::default(), "rs0b:27018");

    let report = coordinator
        .run_audit(&[SeedEntry::new("orders", &["mongos1:27017"], true)])
        .await;
    let orders = report.cluster("orders").unwrap();

    assert_eq!(
        addresses(orders.snapshots(NodeRole::Data)),
        vec!["rs0a:27018", "rs0b:27018"]
    );
    assert!(orders.errors.is_empty());
    assert!(!orders.is_complete());
    assert!(orders.gaps.iter().any(|g| g.kind == FailureKind::Cancelled));
    assert_eq!(connector.contact_count("rs1a:27018"), 0);
    assert_eq!(connector.contact_count("rs1b:27018"), 0);
}

#[tokio::test]
async fn test_sharding_catalog_carried_to_report_and_rows() {
    let uid = IndexKeySpec::new().field("uid", "hashed");
    let fleet = sharded_fleet().node(
        "mongos1:27017",
        FixtureNode::router("3.4.2", "cfgRS/cfg1")
            .with_routers(&["mongos1:27017", "mongos2:27017"])
            .with_shards(&["rs0/rs0a:27018,rs0b:27018", "rs1/rs1a:27018,rs1b:27018"])
            .with_partitioned("app")
            .with_shard_key("app.users", uid.clone()),
    );
    let (coordinator, _) = coordinator(fleet, &AuditConfig::default());

    let report = coordinator
        .run_audit(&[SeedEntry::new("orders", &["mongos1:27017"], true)])
        .await;
    let orders = report.cluster("orders").unwrap();
    assert!(orders.sharding.is_partitioned("app"));
    assert_eq!(orders.sharding.shard_key("app.users"), Some(&uid));

    let rows = catalog_rows(&report);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.sharded));
    assert!(rows.iter().all(|r| r.shard_key == r#"{uid: "hashed"}"#));
    assert!(rows.iter().all(|r| r.shard_key != UNSHARDED));
}

#[tokio::test]
async fn test_replica_set_has_no_sharding_catalog() {
    let (coordinator, _) = coordinator(sharded_fleet(), &AuditConfig::default());
    let report = coordinator
        .run_audit(&[SeedEntry::new("rs0", &["rs0a:27018"], true)])
        .await;
    let rs0 = report.cluster("rs0").unwrap();
    assert!(rs0.sharding.is_empty());
    assert!(catalog_rows(&report).iter().all(|r| !r.sharded));
}
