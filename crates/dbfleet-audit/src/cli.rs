//! Command line front end.

use crate::config::AuditConfig;
use crate::coordinator::AuditCoordinator;
use crate::export::write_index_csv_file;
use crate::fixture::{FixtureConnector, FixtureFleet};
use crate::report::FleetAuditReport;
use crate::seeds::{FileSeedSource, SeedSource};
use crate::simulate::simulated_report;
use crate::types::NodeRole;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "dbfleet-audit")]
#[command(about = "Audit database clusters for minimum versions and index consistency", long_about = None)]
pub struct Cli {
    /// Audit settings file; defaults apply when it does not exist.
    #[arg(short, long, env = "DBFLEET_CONFIG", default_value = "/etc/dbfleet/audit.toml")]
    pub config: PathBuf,

    /// Seed list (TOML `[[clusters]]` or JSON `{"clusters": [...]}`).
    #[arg(short, long)]
    pub seeds: Option<PathBuf>,

    /// Probe an in-memory fleet described by this file instead of live nodes.
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    /// Overrides the configured minimum version.
    #[arg(short, long)]
    pub minimum_version: Option<String>,

    /// Output prefix; the report is written to PREFIX.json.
    #[arg(short, long)]
    pub output_file: Option<String>,

    /// Skip probing and render a canned report.
    #[arg(long)]
    pub simulate: bool,

    /// Also write the index catalog to PREFIX.csv.
    #[arg(long)]
    pub csv: bool,

    /// Clusters audited at once.
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl Cli {
    /// Loads the config file, or defaults when it does not exist, and applies
    /// command line overrides.
    pub fn load_config(&self) -> Result<AuditConfig> {
        let mut config = if self.config.exists() {
            AuditConfig::from_file(&self.config)
                .with_context(|| format!("loading config {}", self.config.display()))?
        } else {
            tracing::warn!("Config file not found, using defaults: {}", self.config.display());
            AuditConfig::default()
        };

        if let Some(ref minimum) = self.minimum_version {
            config.minimum_version = minimum.clone();
        }
        if let Some(ref prefix) = self.output_file {
            config.output_file = prefix.clone();
        }
        if let Some(ref seeds) = self.seeds {
            config.seeds_path = Some(seeds.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent_clusters = concurrency;
        }
        config.validate()?;
        Ok(config)
    }

    /// Runs the audit and writes the report files.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let config = self.load_config()?;

        let report = if self.simulate {
            tracing::info!("simulation mode, no nodes will be contacted");
            simulated_report(&config.minimum_version)
        } else {
            self.audit(&config, cancel).await?
        };

        let json_path = PathBuf::from(format!("{}.json", config.output_file));
        report
            .write_json(&json_path)
            .with_context(|| format!("writing {}", json_path.display()))?;
        tracing::info!("report written to {}", json_path.display());

        if self.csv {
            let csv_path = PathBuf::from(format!("{}.csv", config.output_file));
            write_index_csv_file(&report, &csv_path)
                .with_context(|| format!("writing {}", csv_path.display()))?;
            tracing::info!("index catalog written to {}", csv_path.display());
        }

        print_report(&report, &json_path);
        Ok(())
    }

    async fn audit(&self, config: &AuditConfig, cancel: CancellationToken) -> Result<FleetAuditReport> {
        let Some(ref fixture) = self.fixture else {
            bail!("no live connector is built in; pass --fixture <file> or --simulate");
        };
        let Some(ref seeds_path) = config.seeds_path else {
            bail!("no seed list given; pass --seeds <file> or set seeds_path in the config");
        };

        let fleet = FixtureFleet::from_file(fixture)
            .with_context(|| format!("loading fixture {}", fixture.display()))?;
        let entries = FileSeedSource::new(seeds_path)
            .load()
            .with_context(|| format!("loading seeds {}", seeds_path.display()))?;

        let connector = Arc::new(FixtureConnector::new(fleet));
        let coordinator = AuditCoordinator::from_config(connector, config, cancel)?;
        Ok(coordinator.run_audit(&entries).await)
    }
}

fn print_report(report: &FleetAuditReport, json_path: &Path) {
    println!(
        "Fleet audit against minimum version {} ({} clusters)",
        report.minimum_version,
        report.results.len()
    );
    println!("{}", "=".repeat(60));
    for cluster in report.clusters() {
        println!("{}", cluster.summary());
        for role in NodeRole::ALL {
            for node in cluster.snapshots(role) {
                let marker = if node.valid { "ok" } else { "BELOW MINIMUM" };
                println!(
                    "  {:<7} {:<30} {:<10} {:>3} indexes  {}",
                    role.to_string(),
                    node.snapshot.address.as_str(),
                    node.snapshot.version,
                    node.snapshot.index_count(),
                    marker
                );
            }
        }
        for divergence in &cluster.divergences {
            println!(
                "  divergent {} {}.{} ({:?})",
                divergence.address, divergence.namespace, divergence.index_name, divergence.kind
            );
        }
        for error in &cluster.errors {
            println!("  error {}", error);
        }
        for gap in &cluster.gaps {
            println!("  gap {} [{}] {}", gap.seed, gap.kind, gap.reason);
        }
    }
    println!("{}", "=".repeat(60));
    let status = if report.is_clean() { "clean" } else { "findings" };
    println!("Status: {}  Report: {}", status, json_path.display());
}
