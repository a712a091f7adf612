//! Flattened index catalog export.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::report::FleetAuditReport;

/// Shard key column value for a collection of a partitioned database
/// without a shard key.
pub const UNSHARDED: &str = "Unsharded";

/// One row per (cluster, namespace, index) of each cluster's reference schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRow {
    /// Cluster label.
    pub cluster: String,
    /// Database part of the namespace.
    pub database: String,
    /// Database has sharding enabled.
    pub sharded: bool,
    /// Collection part of the namespace.
    pub collection: String,
    /// Collection shard key, [`UNSHARDED`] in a partitioned database, empty otherwise.
    pub shard_key: String,
    /// Index name.
    pub index_name: String,
    /// Key as rendered by `IndexKeySpec`'s Display.
    pub index_key: String,
    /// Nodes whose definition of this index differs from the reference.
    pub divergent_nodes: usize,
}

/// Rows sorted by cluster, namespace, then index name.
pub fn catalog_rows(report: &FleetAuditReport) -> Vec<CatalogRow> {
    let mut rows = Vec::new();
    for cluster in report.clusters() {
        for (namespace, reference) in cluster.reference.namespaces() {
            let (database, collection) = namespace
                .split_once('.')
                .unwrap_or((namespace.as_str(), ""));
            let sharded = cluster.sharding.is_partitioned(database);
            let shard_key = match cluster.sharding.shard_key(namespace) {
                Some(key) => key.to_string(),
                None if sharded => UNSHARDED.to_string(),
                None => String::new(),
            };
            for (index_name, key) in &reference.indexes {
                let divergent_nodes = cluster
                    .divergences
                    .iter()
                    .filter(|d| &d.namespace == namespace && &d.index_name == index_name)
                    .count();
                rows.push(CatalogRow {
                    cluster: cluster.label.clone(),
                    database: database.to_string(),
                    sharded,
                    collection: collection.to_string(),
                    shard_key: shard_key.clone(),
                    index_name: index_name.clone(),
                    index_key: key.to_string(),
                    divergent_nodes,
                });
            }
        }
    }
    rows
}

/// Writes [`catalog_rows`] as CSV with a header row.
pub fn write_index_csv<W: Write>(report: &FleetAuditReport, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in catalog_rows(report) {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes [`catalog_rows`] to a new CSV file at `path`.
pub fn write_index_csv_file(report: &FleetAuditReport, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_index_csv(report, file)
}
