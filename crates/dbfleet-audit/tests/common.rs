//! Shared fleets and helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbfleet_audit::command::MemberState;
use dbfleet_audit::{
    AuditConfig, AuditCoordinator, Connector, FixtureConnector, FixtureFleet, FixtureNode,
    IndexKeySpec, NodeAddress, NodeCommands,
};
use tokio_util::sync::CancellationToken;

pub fn id_index() -> IndexKeySpec {
    IndexKeySpec::new().field("_id", 1)
}

pub fn email_index() -> IndexKeySpec {
    IndexKeySpec::new().field("email", 1)
}

/// Replica set member serving `app.users` with `_id_` and `email_1`.
pub fn shard_member(state: MemberState, peers: &[&str]) -> FixtureNode {
    FixtureNode::data("3.4.2")
        .member_of(state, peers)
        .with_index("app.users", "_id_", id_index())
        .with_index("app.users", "email_1", email_index())
}

/// Router `mongos1:27017` fronting shards `rs0` and `rs1` (two members each),
/// one config server and two registered routers.
pub fn sharded_fleet() -> FixtureFleet {
    let rs0 = ["rs0a:27018", "rs0b:27018"];
    let rs1 = ["rs1a:27018", "rs1b:27018"];
    FixtureFleet::new()
        .node(
            "mongos1:27017",
            FixtureNode::router("3.4.2", "cfgRS/cfg1")
                .with_routers(&["mongos1:27017", "mongos2:27017"])
                .with_shards(&["rs0/rs0a:27018,rs0b:27018", "rs1/rs1a:27018,rs1b:27018"]),
        )
        .node("mongos2:27017", FixtureNode::router("3.4.2", "cfgRS/cfg1"))
        .node("cfg1:27019", FixtureNode::data("3.4.2"))
        .node("rs0a:27018", shard_member(MemberState::Primary, &rs0))
        .node("rs0b:27018", shard_member(MemberState::Secondary, &rs0))
        .node("rs1a:27018", shard_member(MemberState::Primary, &rs1))
        .node("rs1b:27018", shard_member(MemberState::Secondary, &rs1))
}

pub fn coordinator(
    fleet: FixtureFleet,
    config: &AuditConfig,
) -> (AuditCoordinator, Arc<FixtureConnector>) {
    let connector = Arc::new(FixtureConnector::new(fleet));
    let coordinator =
        AuditCoordinator::from_config(connector.clone(), config, CancellationToken::new())
            .expect("valid config");
    (coordinator, connector)
}

/// Fixture connector that cancels `token` when `trigger` is contacted.
/// The contact itself still goes through.
pub struct CancelOnContact {
    pub inner: Arc<FixtureConnector>,
    pub trigger: NodeAddress,
    pub token: CancellationToken,
}

#[async_trait]
impl Connector for CancelOnContact {
    async fn connect(
        &self,
        address: &NodeAddress,
        connect_timeout: Duration,
    ) -> dbfleet_audit::Result<Box<dyn NodeCommands>> {
        if *address == self.trigger {
            self.token.cancel();
        }
        self.inner.connect(address, connect_timeout).await
    }
}

/// Coordinator whose audit is cancelled once `trigger` is contacted.
pub fn cancelling_coordinator(
    fleet: FixtureFleet,
    config: &AuditConfig,
    trigger: &str,
) -> (AuditCoordinator, Arc<FixtureConnector>) {
    let inner = Arc::new(FixtureConnector::new(fleet));
    let token = CancellationToken::new();
    let connector = Arc::new(CancelOnContact {
        inner: inner.clone(),
        trigger: NodeAddress::new(trigger),
        token: token.clone(),
    });
    let coordinator =
        AuditCoordinator::from_config(connector, config, token).expect("valid config");
    (coordinator, inner)
}
