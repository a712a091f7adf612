//! Administrative command interface to a single database node.
//!
//! The wire protocol lives outside this crate. A [`Connector`] opens a
//! session to an address and hands back a [`NodeCommands`] implementation
//! that answers the handful of read-only queries the audit needs.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{IndexKeySpec, NamespaceIndexes, NodeAddress};

/// Process kind as reported by a node's status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    /// A data-bearing server process.
    Data,
    /// A query router.
    Router,
}

/// Replication state of a data-bearing node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    /// Replica set primary.
    Primary,
    /// Replica set secondary.
    Secondary,
    /// Not part of a replica set.
    Standalone,
    /// Arbiter, recovering, startup and other non-serving states.
    Other(String),
}

impl MemberState {
    /// Returns true if the node serves reads and holds a full data copy.
    pub fn is_serving(&self) -> bool {
        matches!(
            self,
            MemberState::Primary | MemberState::Secondary | MemberState::Standalone
        )
    }
}

/// Answer to the status command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Data server or router.
    pub process: ProcessKind,
    /// Version string as reported.
    pub version: String,
    /// Replication state.
    pub member_state: MemberState,
}

/// One entry of the database listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Reported as holding no data.
    #[serde(default)]
    pub empty: bool,
}

/// Partitioning metadata held by a sharded cluster's config servers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingCatalog {
    /// Databases with sharding enabled.
    pub partitioned: BTreeSet<String>,
    /// Shard key of every sharded, non-dropped collection, by namespace.
    pub shard_keys: BTreeMap<String, IndexKeySpec>,
}

impl ShardingCatalog {
    /// Returns true if `database` has sharding enabled.
    pub fn is_partitioned(&self, database: &str) -> bool {
        self.partitioned.contains(database)
    }

    /// Shard key of `namespace`, if the collection is sharded.
    pub fn shard_key(&self, namespace: &str) -> Option<&IndexKeySpec> {
        self.shard_keys.get(namespace)
    }

    /// Adds every entry of `other` not already present.
    pub fn merge(&mut self, other: &ShardingCatalog) {
        self.partitioned.extend(other.partitioned.iter().cloned());
        for (namespace, key) in &other.shard_keys {
            self.shard_keys
                .entry(namespace.clone())
                .or_insert_with(|| key.clone());
        }
    }

    /// Returns true if nothing is partitioned.
    pub fn is_empty(&self) -> bool {
        self.partitioned.is_empty() && self.shard_keys.is_empty()
    }
}

/// Read-only administrative queries against one connected node.
#[async_trait]
pub trait NodeCommands: Send + Sync {
    /// Process role, version and replication state.
    async fn status(&self) -> Result<ServerStatus>;

    /// Replica set member hosts, or an empty list when the node has no
    /// replica set configuration.
    async fn peer_config(&self) -> Result<Vec<NodeAddress>>;

    /// Config server connection string from the router's command line
    /// options (`[replSetName/]host1,host2,...`).
    async fn router_config(&self) -> Result<String>;

    /// Routers registered with the cluster.
    async fn router_registrations(&self) -> Result<Vec<NodeAddress>>;

    /// Shards registered with the cluster, each as a replica set string.
    async fn shard_registrations(&self) -> Result<Vec<String>>;

    /// Partitioned databases and collection shard keys, read through a router.
    async fn sharding_catalog(&self) -> Result<ShardingCatalog>;

    /// Databases on the node.
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>>;

    /// Non-system collections of `database`, as `database.collection`.
    async fn list_namespaces(&self, database: &str) -> Result<Vec<String>>;

    /// Index name to key specification for `namespace`.
    async fn list_indexes(&self, namespace: &str) -> Result<NamespaceIndexes>;
}

/// Opens sessions to nodes.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connect to `address`, failing with a connect failure if the node
    /// does not accept the session within `connect_timeout`.
    async fn connect(
        &self,
        address: &NodeAddress,
        connect_timeout: Duration,
    ) -> Result<Box<dyn NodeCommands>>;
}
