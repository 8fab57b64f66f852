//! # Pod Group Controller CLI
//!
//! Runs the controller against an in-memory store seeded from a YAML manifest
//! and prints the resulting member state. Also validates configuration files.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use podgroup_controller::config::{ConfigManager, ControllerConfig};
use podgroup_controller::store::{InMemoryMemberStore, MemberManifest};
use podgroup_controller::constants::system::CONTROLLER_NAME;
use podgroup_controller::{build_driver, logging, DriverHandle, DriverStats, Member, MemberPhase};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = CONTROLLER_NAME)]
#[command(about = "Mark pod groups ready once every member is running")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (default: layered config/podgroup.* plus environment)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Seed an in-memory store from a manifest, reconcile until settled, print members
    Run {
        /// YAML manifest listing members
        #[arg(short, long)]
        manifest: PathBuf,

        /// Maximum time to wait for the controller to settle, in milliseconds
        #[arg(long, default_value_t = 5_000)]
        settle_ms: u64,

        /// After the first settle, move every Pending member to Running and settle again
        #[arg(long)]
        promote_pending: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Load and validate configuration, then print it
    ValidateConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();

    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from_file(path),
        None => ConfigManager::load(),
    }
    .context("failed to load configuration")?;

    match cli.command {
        Commands::Run {
            manifest,
            settle_ms,
            promote_pending,
            format,
        } => {
            run(
                manager.config(),
                &manifest,
                Duration::from_millis(settle_ms),
                promote_pending,
                format,
            )
            .await
        }
        Commands::ValidateConfig => {
            println!("{}", serde_json::to_string_pretty(manager.config())?);
            println!("configuration is valid (environment: {})", manager.environment());
            Ok(())
        }
    }
}

/// Final member state and driver counters of one `run`
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub members: Vec<Member>,
    pub stats: DriverStats,
}

async fn run(
    config: &ControllerConfig,
    manifest_path: &Path,
    settle: Duration,
    promote_pending: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let report = simulate(config, manifest_path, settle, promote_pending).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            print_table(config, &report.members);
            println!(
                "\nreconciles: {}  markers written: {}  failures: {}",
                report.stats.reconciles, report.stats.markers_written, report.stats.failures
            );
        }
    }

    Ok(())
}

/// Seed a fresh store from the manifest, let the driver settle and collect the result
async fn simulate(
    config: &ControllerConfig,
    manifest_path: &Path,
    settle: Duration,
    promote_pending: bool,
) -> anyhow::Result<RunReport> {
    let manifest = MemberManifest::from_file(manifest_path)
        .with_context(|| format!("failed to read manifest {}", manifest_path.display()))?;

    let store = Arc::new(InMemoryMemberStore::with_event_capacity(
        config.driver.event_buffer,
    ));
    let driver = Arc::new(build_driver(store.clone(), config));
    let handle = Arc::clone(&driver).start(store.subscribe());

    let seeded = manifest.seed(&store);
    info!(members = seeded.len(), "Store seeded from manifest");

    settle_driver(&handle, &store, settle).await;

    if promote_pending {
        let pending: Vec<Member> = store
            .snapshot()
            .into_iter()
            .filter(|member| member.phase == MemberPhase::Pending)
            .collect();
        for member in &pending {
            store.set_phase(&member.key(), MemberPhase::Running)?;
        }
        info!(promoted = pending.len(), "Pending members moved to Running");

        settle_driver(&handle, &store, settle).await;
    }

    let stats = handle.shutdown().await?;
    Ok(RunReport {
        members: store.snapshot(),
        stats,
    })
}

async fn settle_driver(handle: &DriverHandle, store: &Arc<InMemoryMemberStore>, settle: Duration) {
    let feed = Arc::clone(store);
    if !handle
        .wait_until_settled(move || feed.stats().events_published, settle)
        .await
    {
        warn!(stats = ?handle.stats(), "Controller did not settle before the deadline");
    }
}

fn print_table(config: &ControllerConfig, members: &[Member]) {
    let group_label = &config.labels.group_label;
    let ready_label = &config.labels.ready_label;

    println!(
        "{:<16} {:<24} {:<16} {:<10} {:<6}",
        "NAMESPACE", "NAME", "GROUP", "PHASE", "READY"
    );
    for member in members {
        println!(
            "{:<16} {:<24} {:<16} {:<10} {:<6}",
            member.namespace,
            member.name,
            member.group(group_label).unwrap_or("-"),
            member.phase.to_string(),
            if member.is_marked_ready(ready_label) {
                "true"
            } else {
                "-"
            }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn demo_manifest() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/job-1.yaml")
    }

    fn marked(report: &RunReport, config: &ControllerConfig) -> Vec<String> {
        report
            .members
            .iter()
            .filter(|member| member.is_marked_ready(&config.labels.ready_label))
            .map(|member| member.name.clone())
            .collect()
    }

    #[test]
    fn test_cli_parses_run_arguments() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), CONTROLLER_NAME);

        let cli = Cli::try_parse_from([
            CONTROLLER_NAME,
            "run",
            "--manifest",
            "demos/job-1.yaml",
            "--promote-pending",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                promote_pending,
                format,
                settle_ms,
                ..
            } => {
                assert!(promote_pending);
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(settle_ms, 5_000);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_demo_manifest_marks_only_complete_groups() {
        let config = ControllerConfig::default();
        let report = simulate(&config, &demo_manifest(), Duration::from_secs(5), false)
            .await
            .unwrap();

        assert_eq!(report.members.len(), 5);
        assert_eq!(marked(&report, &config), vec!["job-2-worker-0", "job-2-worker-1"]);
        assert_eq!(report.stats.markers_written, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_promote_pending_completes_remaining_groups() {
        let config = ControllerConfig::default();
        let report = simulate(&config, &demo_manifest(), Duration::from_secs(5), true)
            .await
            .unwrap();

        assert_eq!(
            marked(&report, &config),
            vec!["job-1-worker-0", "job-1-worker-1", "job-2-worker-0", "job-2-worker-1"]
        );
        assert!(report
            .members
            .iter()
            .all(|member| member.phase == MemberPhase::Running));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["members"].as_array().map(Vec::len), Some(5));
        assert_eq!(json["stats"]["markers_written"], 4);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_reported() {
        let error = simulate(
            &ControllerConfig::default(),
            Path::new("does-not-exist.yaml"),
            Duration::from_millis(10),
            false,
        )
        .await
        .unwrap_err();
        assert!(error.to_string().contains("does-not-exist.yaml"));
    }
}
