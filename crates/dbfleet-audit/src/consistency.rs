//! Reference index schema and per-node divergence detection.
//!
//! The first snapshot that mentions a namespace/index pair fixes the
//! reference key for that pair; later snapshots are compared against it and
//! never overwrite it. The node visited first therefore acts as ground truth.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{IndexKeySpec, NamespaceIndexes, NodeAddress, NodeSnapshot};

/// Reference indexes of one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceNamespace {
    /// Number of indexes the first reporter had.
    pub index_count: usize,
    /// Index name to key, first-write-wins.
    pub indexes: NamespaceIndexes,
}

/// How an observed index differs from the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    /// Both sides define the index with different keys.
    KeyMismatch,
    /// The reference defines an index the node lacks.
    MissingOnNode,
    /// The node defines an index the reference lacks.
    ExtraOnNode,
}

/// One differing (address, namespace, index) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDivergence {
    /// Node that differs.
    pub address: NodeAddress,
    /// Namespace the index belongs to.
    pub namespace: String,
    /// Index name.
    pub index_name: String,
    /// How the node differs.
    pub kind: DivergenceKind,
    /// Key the node reported, if any.
    pub observed: Option<IndexKeySpec>,
    /// Key the reference holds, if any.
    pub reference: Option<IndexKeySpec>,
}

/// Per-cluster reference schema: namespace to reference indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceSchema {
    namespaces: BTreeMap<String, ReferenceNamespace>,
}

impl ReferenceSchema {
    /// Empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records any namespace/index pair not seen before, then compares the
    /// snapshot against the reference.
    pub fn observe(&mut self, snapshot: &NodeSnapshot) -> Vec<IndexDivergence> {
        for (namespace, indexes) in &snapshot.indexes {
            let entry = self.namespaces.entry(namespace.clone()).or_default();
            for (name, key) in indexes {
                if !entry.indexes.contains_key(name) {
                    entry.indexes.insert(name.clone(), key.clone());
                    entry.index_count += 1;
                }
            }
        }
        self.compare(snapshot)
    }

    /// Symmetric difference between the snapshot and the reference, limited
    /// to the namespaces the snapshot reports.
    pub fn compare(&self, snapshot: &NodeSnapshot) -> Vec<IndexDivergence> {
        let empty = NamespaceIndexes::new();
        let mut divergences = Vec::new();

        for (namespace, observed) in &snapshot.indexes {
            let reference = self
                .namespaces
                .get(namespace)
                .map(|ns| &ns.indexes)
                .unwrap_or(&empty);
            let names: BTreeSet<&String> = observed.keys().chain(reference.keys()).collect();

            for name in names {
                let kind = match (observed.get(name), reference.get(name)) {
                    (Some(o), Some(r)) if o == r => continue,
                    (Some(_), Some(_)) => DivergenceKind::KeyMismatch,
                    (Some(_), None) => DivergenceKind::ExtraOnNode,
                    (None, Some(_)) => DivergenceKind::MissingOnNode,
                    (None, None) => continue,
                };
                divergences.push(IndexDivergence {
                    address: snapshot.address.clone(),
                    namespace: namespace.clone(),
                    index_name: name.clone(),
                    kind,
                    observed: observed.get(name).cloned(),
                    reference: reference.get(name).cloned(),
                });
            }
        }
        divergences
    }

    /// Reference for one namespace.
    pub fn get(&self, namespace: &str) -> Option<&ReferenceNamespace> {
        self.namespaces.get(namespace)
    }

    /// Reference key of one index.
    pub fn index(&self, namespace: &str, index_name: &str) -> Option<&IndexKeySpec> {
        self.namespaces
            .get(namespace)
            .and_then(|ns| ns.indexes.get(index_name))
    }

    /// Namespaces in ascending order; indexes within each are ascending by name.
    pub fn namespaces(&self) -> impl Iterator<Item = (&String, &ReferenceNamespace)> {
        self.namespaces.iter()
    }

    /// Number of namespaces held.
    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    /// Returns true if no namespace was observed.
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}
