#![warn(missing_docs)]

//! dbfleet audit: topology discovery, version gate and index consistency checks across a fleet of database clusters

pub mod cli;
pub mod command;
pub mod config;
pub mod consistency;
pub mod coordinator;
pub mod error;
pub mod export;
pub mod failover;
pub mod fixture;
pub mod probe;
pub mod report;
pub mod seeds;
pub mod simulate;
pub mod topology;
pub mod traversal;
pub mod types;
pub mod version;

pub use command::{Connector, NodeCommands};
pub use config::AuditConfig;
pub use consistency::{DivergenceKind, IndexDivergence, ReferenceSchema};
pub use coordinator::AuditCoordinator;
pub use error::{AuditError, FailureKind, ProbeFailure, Result};
pub use fixture::{FixtureConnector, FixtureFleet, FixtureNode};
pub use probe::{NodeProbe, ProbeSettings};
pub use report::{ClusterAuditResult, FleetAuditReport, ProbedNode};
pub use seeds::{FileSeedSource, SeedEntry, SeedSource};
pub use topology::{TopologyGap, TopologyPlan, TopologyResolver};
pub use traversal::TraversalEngine;
pub use types::{IndexKeySpec, NodeAddress, NodeRole, NodeSnapshot};
pub use version::{is_valid, Version, VersionGate};
