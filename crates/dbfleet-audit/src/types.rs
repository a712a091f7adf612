//! Core value types shared by the probe, topology and consistency modules.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A `host:port` string identifying one node.
///
/// Equality is exact string equality; no DNS normalization is performed.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Wraps an address string, trimming surrounding whitespace.
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let trimmed = addr.trim();
        if trimmed.len() == addr.len() {
            Self(addr)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the address carries an explicit port.
    pub fn has_port(&self) -> bool {
        match self.0.rfind(':') {
            // bracketed IPv6 without port: "[::1]"
            Some(idx) => !self.0[idx..].contains(']') && idx + 1 < self.0.len(),
            None => false,
        }
    }

    /// Appends `port` when the address has none. A dangling `:` is dropped first.
    pub fn with_default_port(self, port: u16) -> Self {
        if self.has_port() {
            return self;
        }
        let host = self.0.strip_suffix(':').unwrap_or(&self.0);
        Self(format!("{}:{}", host, port))
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(s: &str) -> Self {
        NodeAddress::new(s)
    }
}

impl From<String> for NodeAddress {
    fn from(s: String) -> Self {
        NodeAddress::new(s)
    }
}

/// Role of an audited node, established once per probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Standalone node or replica set member holding data.
    Data,
    /// Query router fronting a sharded cluster.
    Router,
    /// Config server of a sharded cluster.
    Config,
}

impl NodeRole {
    /// All roles in report order.
    pub const ALL: [NodeRole; 3] = [NodeRole::Config, NodeRole::Data, NodeRole::Router];

    /// Returns true for roles whose index catalog takes part in the consistency check.
    pub fn is_data_bearing(&self) -> bool {
        matches!(self, NodeRole::Data)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Data => write!(f, "data"),
            NodeRole::Router => write!(f, "router"),
            NodeRole::Config => write!(f, "config"),
        }
    }
}

/// Direction (or special type) of one indexed field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyDirection {
    /// `1` / `-1` style ordering.
    Numeric(i64),
    /// Special index types such as `"text"`, `"hashed"` or `"2dsphere"`.
    Named(String),
}

impl From<i64> for KeyDirection {
    fn from(v: i64) -> Self {
        KeyDirection::Numeric(v)
    }
}

impl From<i32> for KeyDirection {
    fn from(v: i32) -> Self {
        KeyDirection::Numeric(v.into())
    }
}

impl From<&str> for KeyDirection {
    fn from(v: &str) -> Self {
        KeyDirection::Named(v.to_string())
    }
}

impl fmt::Display for KeyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDirection::Numeric(n) => write!(f, "{}", n),
            KeyDirection::Named(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Ordered field/direction pairs defining an index. Field order is significant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexKeySpec(pub Vec<(String, KeyDirection)>);

impl IndexKeySpec {
    /// Empty key specification.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a field to the specification.
    pub fn field(mut self, name: &str, direction: impl Into<KeyDirection>) -> Self {
        self.0.push((name.to_string(), direction.into()));
        self
    }

    /// Number of fields in the key.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IndexKeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (field, dir)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field, dir)?;
        }
        write!(f, "}}")
    }
}

/// Index name to key specification for one namespace.
pub type NamespaceIndexes = BTreeMap<String, IndexKeySpec>;

/// Namespace (`database.collection`) to its index definitions.
pub type IndexCatalog = BTreeMap<String, NamespaceIndexes>;

/// Immutable observation of one node produced by a probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Address the node was probed at.
    pub address: NodeAddress,
    /// Role established by the probe.
    pub role: NodeRole,
    /// Version string as the node reported it.
    pub version: String,
    /// Index definitions; empty for routers and config servers.
    pub indexes: IndexCatalog,
}

impl NodeSnapshot {
    /// Total number of indexes across all namespaces.
    pub fn index_count(&self) -> usize {
        self.indexes.values().map(|ns| ns.len()).sum()
    }
}
