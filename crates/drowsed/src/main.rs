//! drowsed - The drowse background service
//!
//! This is the main entry point for the service.
//! It wires together all the components:
//! - Configuration loading
//! - Proxmox API client and local power control
//! - Startup permission preflight
//! - The idle shutdown scheduler

use anyhow::{Context, Result};
use clap::Parser;
use drowse_config::load_config;
use drowse_core::{Scheduler, preflight};
use drowse_host_api::{ClusterApi, LocalPower};
use drowse_host_pve::{PveClient, SystemPower};
use drowse_util::{default_config_path, is_mock_time_active};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// drowsed - Tag-driven idle shutdown for Proxmox nodes
#[derive(Parser, Debug)]
#[command(name = "drowsed")]
#[command(about = "Tag-driven idle shutdown for Proxmox nodes and workloads", long_about = None)]
struct Args {
    /// Configuration file path (default: /etc/drowse/config.toml, or $DROWSE_CONFIG)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Force dry-run: never power nodes off, whatever the config says
    #[arg(long)]
    dry_run: bool,
}

/// Main service state
struct Service {
    scheduler: Scheduler,
}

impl Service {
    /// Returns None when the service is disabled in the config
    async fn new(args: &Args) -> Result<Option<Self>> {
        let mut policy = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        if args.dry_run {
            policy.dry_run = true;
        }

        info!(
            config_path = %args.config.display(),
            monitored_nodes = ?policy.monitored_nodes,
            local_node = %policy.local_node,
            stages = policy.stages.len(),
            dry_run = policy.dry_run,
            "Configuration loaded"
        );

        if !policy.enabled {
            warn!("Service disabled in configuration (enabled = false), exiting");
            return Ok(None);
        }

        if is_mock_time_active() {
            warn!("Mock time is active; the daily shutdown window uses the mocked clock");
        }

        let api: Arc<dyn ClusterApi> =
            Arc::new(PveClient::new(&policy.api).context("Failed to create Proxmox client")?);
        let local: Arc<dyn LocalPower> = Arc::new(SystemPower::new());

        let report = preflight(api.as_ref(), &policy)
            .await
            .context("Startup preflight failed")?;
        info!(
            nodes = report.nodes.len(),
            warnings = report.warnings.len(),
            "Preflight passed"
        );

        Ok(Some(Self {
            scheduler: Scheduler::new(api, local, policy),
        }))
    }

    async fn run(mut self) -> Result<()> {
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, stopping after current tick"),
                _ = sigint.recv() => info!("Received SIGINT, stopping after current tick"),
                _ = sighup.recv() => info!("Received SIGHUP, stopping after current tick"),
            }
            let _ = stop_tx.send(true);
        });

        info!("Service running");
        self.scheduler.run(stop_rx).await?;

        info!("drowsed stopped");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "drowsed starting");

    match Service::new(&args).await? {
        Some(service) => service.run().await,
        None => Ok(()),
    }
}
