//! In-memory fleet implementing the command interface.
//!
//! A fixture describes every node of a fleet by address. It backs the test
//! suite and offline audits driven from a TOML/JSON description, and keeps
//! an ordered log of every address a connection was attempted to.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::{
    Connector, DatabaseInfo, MemberState, NodeCommands, ProcessKind, ServerStatus,
    ShardingCatalog,
};
use crate::error::{AuditError, Result};
use crate::types::{IndexKeySpec, NamespaceIndexes, NodeAddress};

fn default_process() -> ProcessKind {
    ProcessKind::Data
}

fn default_member_state() -> MemberState {
    MemberState::Standalone
}

/// A database within a fixture node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureDatabase {
    /// Reported as empty by `list_databases`.
    pub empty: bool,
    /// Collection name to its indexes.
    pub collections: BTreeMap<String, NamespaceIndexes>,
}

/// Simulated state of one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureNode {
    /// Every connect attempt fails.
    #[serde(default)]
    pub unreachable: bool,
    /// Answers the status command with a malformed payload.
    #[serde(default)]
    pub malformed: bool,
    /// Delay applied to the status command of a connected node.
    #[serde(default)]
    pub latency_ms: u64,
    /// Process role reported by `status`.
    #[serde(default = "default_process")]
    pub process: ProcessKind,
    /// Version string the node reports.
    #[serde(default)]
    pub version: String,
    /// Replica set state reported by `status`.
    #[serde(default = "default_member_state")]
    pub member_state: MemberState,
    /// Replica set members, including this node.
    #[serde(default)]
    pub peers: Vec<String>,
    /// Config server string a router reports.
    #[serde(default)]
    pub config_db: Option<String>,
    /// Registered routers.
    #[serde(default)]
    pub routers: Vec<String>,
    /// Shard strings in `rs/host,host` form.
    #[serde(default)]
    pub shards: Vec<String>,
    /// Sharding metadata a router reports for its cluster.
    #[serde(default)]
    pub sharding: ShardingCatalog,
    /// Database name to contents.
    #[serde(default)]
    pub databases: BTreeMap<String, FixtureDatabase>,
}

impl FixtureNode {
    /// A reachable standalone data node.
    pub fn data(version: &str) -> Self {
        Self {
            unreachable: false,
            malformed: false,
            latency_ms: 0,
            process: ProcessKind::Data,
            version: version.to_string(),
            member_state: MemberState::Standalone,
            peers: Vec::new(),
            config_db: None,
            routers: Vec::new(),
            shards: Vec::new(),
            sharding: ShardingCatalog::default(),
            databases: BTreeMap::new(),
        }
    }

    /// A reachable router pointing at `config_db`.
    pub fn router(version: &str, config_db: &str) -> Self {
        Self {
            process: ProcessKind::Router,
            config_db: Some(config_db.to_string()),
            ..Self::data(version)
        }
    }

    /// A node that refuses connections.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::data("0.0.0")
        }
    }

    /// Makes the node a replica set member.
    pub fn member_of(mut self, state: MemberState, peers: &[&str]) -> Self {
        self.member_state = state;
        self.peers = peers.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Adds one index to a namespace.
    pub fn with_index(mut self, namespace: &str, name: &str, key: IndexKeySpec) -> Self {
        let (db, coll) = namespace.split_once('.').unwrap_or((namespace, ""));
        self.databases
            .entry(db.to_string())
            .or_default()
            .collections
            .entry(coll.to_string())
            .or_default()
            .insert(name.to_string(), key);
        self
    }

    /// Adds a database reported as empty.
    pub fn with_empty_database(mut self, db: &str) -> Self {
        self.databases.entry(db.to_string()).or_default().empty = true;
        self
    }

    /// Sets the routers a router reports as registered.
    pub fn with_routers(mut self, routers: &[&str]) -> Self {
        self.routers = routers.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Sets the shard strings a router reports.
    pub fn with_shards(mut self, shards: &[&str]) -> Self {
        self.shards = shards.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Marks `db` as partitioned in the router's sharding metadata.
    pub fn with_partitioned(mut self, db: &str) -> Self {
        self.sharding.partitioned.insert(db.to_string());
        self
    }

    /// Records a shard key and marks the database partitioned.
    pub fn with_shard_key(mut self, namespace: &str, key: IndexKeySpec) -> Self {
        let db = namespace.split_once('.').map_or(namespace, |(db, _)| db);
        self.sharding.partitioned.insert(db.to_string());
        self.sharding.shard_keys.insert(namespace.to_string(), key);
        self
    }

    /// Delays every command by `latency_ms`.
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Status responses fail to decode.
    pub fn malformed(mut self) -> Self {
        self.malformed = true;
        self
    }
}

/// Node address to simulated node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureFleet {
    /// Address to node.
    #[serde(default)]
    pub nodes: BTreeMap<String, FixtureNode>,
}

impl FixtureFleet {
    /// Empty fleet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node at `address`.
    pub fn node(mut self, address: &str, node: FixtureNode) -> Self {
        self.nodes.insert(address.to_string(), node);
        self
    }

    /// Loads a fleet from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext.to_lowercase().as_str() {
            "toml" => Ok(toml::from_str(&contents)?),
            "json" => Ok(serde_json::from_str(&contents)?),
            _ => Err(AuditError::Config(format!(
                "unsupported fixture file extension: {}",
                ext
            ))),
        }
    }
}

/// [`Connector`] over a [`FixtureFleet`].
#[derive(Debug, Clone)]
pub struct FixtureConnector {
    fleet: Arc<FixtureFleet>,
    contacts: Arc<Mutex<Vec<NodeAddress>>>,
}

impl FixtureConnector {
    /// Connector over `fleet` with an empty contact log.
    pub fn new(fleet: FixtureFleet) -> Self {
        Self {
            fleet: Arc::new(fleet),
            contacts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every address a connection was attempted to, in order.
    pub fn contacts(&self) -> Vec<NodeAddress> {
        self.contacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of connection attempts made to `address`.
    pub fn contact_count(&self, address: &str) -> usize {
        self.contacts()
            .iter()
            .filter(|a| a.as_str() == address)
            .count()
    }
}

#[async_trait]
impl Connector for FixtureConnector {
    async fn connect(
        &self,
        address: &NodeAddress,
        _connect_timeout: Duration,
    ) -> Result<Box<dyn NodeCommands>> {
        self.contacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(address.clone());

        match self.fleet.nodes.get(address.as_str()) {
            Some(node) if !node.unreachable => Ok(Box::new(FixtureSession {
                address: address.clone(),
                node: node.clone(),
            })),
            _ => Err(AuditError::ConnectFailure {
                address: address.to_string(),
                msg: "connection refused".to_string(),
            }),
        }
    }
}

struct FixtureSession {
    address: NodeAddress,
    node: FixtureNode,
}

impl FixtureSession {
    fn malformed(&self, msg: &str) -> AuditError {
        AuditError::MalformedResponse {
            address: self.address.to_string(),
            msg: msg.to_string(),
        }
    }

    fn require_router(&self) -> Result<()> {
        match self.node.process {
            ProcessKind::Router => Ok(()),
            ProcessKind::Data => Err(self.malformed("command only supported on routers")),
        }
    }
}

#[async_trait]
impl NodeCommands for FixtureSession {
    async fn status(&self) -> Result<ServerStatus> {
        if self.node.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.node.latency_ms)).await;
        }
        if self.node.malformed {
            return Err(self.malformed("status reply missing 'process' field"));
        }
        Ok(ServerStatus {
            process: self.node.process,
            version: self.node.version.clone(),
            member_state: self.node.member_state.clone(),
        })
    }

    async fn peer_config(&self) -> Result<Vec<NodeAddress>> {
        Ok(self.node.peers.iter().map(NodeAddress::new).collect())
    }

    async fn router_config(&self) -> Result<String> {
        self.require_router()?;
        self.node
            .config_db
            .clone()
            .ok_or_else(|| self.malformed("no configdb option"))
    }

    async fn router_registrations(&self) -> Result<Vec<NodeAddress>> {
        self.require_router()?;
        Ok(self.node.routers.iter().map(NodeAddress::new).collect())
    }

    async fn shard_registrations(&self) -> Result<Vec<String>> {
        self.require_router()?;
        Ok(self.node.shards.clone())
    }

    async fn sharding_catalog(&self) -> Result<ShardingCatalog> {
        self.require_router()?;
        Ok(self.node.sharding.clone())
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        Ok(self
            .node
            .databases
            .iter()
            .map(|(name, db)| DatabaseInfo {
                name: name.clone(),
                empty: db.empty,
            })
            .collect())
    }

    async fn list_namespaces(&self, database: &str) -> Result<Vec<String>> {
        let db = self
            .node
            .databases
            .get(database)
            .ok_or_else(|| self.malformed("unknown database"))?;
        Ok(db
            .collections
            .keys()
            .map(|coll| format!("{}.{}", database, coll))
            .collect())
    }

    async fn list_indexes(&self, namespace: &str) -> Result<NamespaceIndexes> {
        let (db, coll) = namespace
            .split_once('.')
            .ok_or_else(|| self.malformed("namespace without collection"))?;
        self.node
            .databases
            .get(db)
            .and_then(|d| d.collections.get(coll))
            .cloned()
            .ok_or_else(|| self.malformed("unknown namespace"))
    }
}
