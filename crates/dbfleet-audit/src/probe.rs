//! Read-only probing of a single node.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::command::{Connector, NodeCommands, ProcessKind, ServerStatus};
use crate::config::AuditConfig;
use crate::error::{AuditError, ProbeFailure, Result};
use crate::types::{IndexCatalog, NodeAddress, NodeRole, NodeSnapshot};

/// Timeouts and database filters applied by every probe.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Upper bound on one whole probe, connection included.
    pub node_deadline: Duration,
    /// Databases never enumerated.
    pub excluded_databases: Vec<String>,
    /// Skip databases reported empty.
    pub skip_empty_databases: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::from(&AuditConfig::default())
    }
}

impl From<&AuditConfig> for ProbeSettings {
    fn from(config: &AuditConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            node_deadline: config.node_deadline(),
            excluded_databases: config.excluded_databases.clone(),
            skip_empty_databases: config.skip_empty_databases,
        }
    }
}

/// Issues status, catalog and membership queries against nodes.
#[derive(Clone)]
pub struct NodeProbe {
    connector: Arc<dyn Connector>,
    settings: ProbeSettings,
}

impl NodeProbe {
    /// Probe connecting through `connector`.
    pub fn new(connector: Arc<dyn Connector>, settings: ProbeSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    pub(crate) async fn with_deadline<T, F>(&self, address: &NodeAddress, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.settings.node_deadline, fut).await {
            Ok(res) => res,
            Err(_) => Err(AuditError::ConnectFailure {
                address: address.to_string(),
                msg: format!(
                    "deadline of {}ms exceeded",
                    self.settings.node_deadline.as_millis()
                ),
            }),
        }
    }

    async fn connect(&self, address: &NodeAddress) -> Result<Box<dyn NodeCommands>> {
        self.connector
            .connect(address, self.settings.connect_timeout)
            .await
    }

    /// Connects and reads the node's status, keeping the session open for
    /// follow-up router queries.
    pub async fn open(&self, address: &NodeAddress) -> Result<(Box<dyn NodeCommands>, ServerStatus)> {
        self.with_deadline(address, async {
            let session = self.connect(address).await?;
            let status = session.status().await?;
            Ok((session, status))
        })
        .await
    }

    /// Membership as reported by `address`; a node without replica set
    /// configuration is its own single member.
    pub async fn peers(&self, address: &NodeAddress) -> Result<Vec<NodeAddress>> {
        self.with_deadline(address, async {
            let session = self.connect(address).await?;
            let peers = session.peer_config().await?;
            if peers.is_empty() {
                Ok(vec![address.clone()])
            } else {
                Ok(peers)
            }
        })
        .await
    }

    /// Probes `address` once.
    ///
    /// `role_override` forces the recorded role regardless of what the node
    /// reports (config servers report themselves as plain data nodes).
    pub async fn probe(
        &self,
        address: &NodeAddress,
        role_override: Option<NodeRole>,
    ) -> std::result::Result<NodeSnapshot, ProbeFailure> {
        debug!(%address, "probing node");
        self.with_deadline(address, self.probe_inner(address, role_override))
            .await
            .map_err(|e| ProbeFailure::from_error(address.clone(), &e))
    }

    async fn probe_inner(
        &self,
        address: &NodeAddress,
        role_override: Option<NodeRole>,
    ) -> Result<NodeSnapshot> {
        let session = self.connect(address).await?;
        let status = session.status().await?;
        if status.version.trim().is_empty() {
            return Err(AuditError::MalformedResponse {
                address: address.to_string(),
                msg: "status reply without version".to_string(),
            });
        }

        let role = role_override.unwrap_or(match status.process {
            ProcessKind::Data => NodeRole::Data,
            ProcessKind::Router => NodeRole::Router,
        });

        if role.is_data_bearing() && !status.member_state.is_serving() {
            return Err(AuditError::NotDataBearing {
                address: address.to_string(),
                state: format!("{:?}", status.member_state),
            });
        }

        let indexes = if role.is_data_bearing() {
            self.collect_indexes(session.as_ref()).await?
        } else {
            IndexCatalog::new()
        };

        Ok(NodeSnapshot {
            address: address.clone(),
            role,
            version: status.version,
            indexes,
        })
    }

    async fn collect_indexes(&self, session: &dyn NodeCommands) -> Result<IndexCatalog> {
        let mut catalog = IndexCatalog::new();
        for db in session.list_databases().await? {
            if self.settings.excluded_databases.iter().any(|x| *x == db.name) {
                debug!(database = %db.name, "skipping system database");
                continue;
            }
            if db.empty && self.settings.skip_empty_databases {
                debug!(database = %db.name, "skipping empty database");
                continue;
            }
            for namespace in session.list_namespaces(&db.name).await? {
                let indexes = session.list_indexes(&namespace).await?;
                catalog.insert(namespace, indexes);
            }
        }
        Ok(catalog)
    }
}
