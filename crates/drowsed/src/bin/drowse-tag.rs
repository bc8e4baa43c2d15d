//! Tagging CLI tool
//!
//! Lists workloads with their tags, or adds the safe-shutdown tag (or any
//! other tag) to workloads so drowsed may stop them.

use anyhow::{Context, Result, bail};
use clap::Parser;
use drowse_config::{check_tag, load_config};
use drowse_host_api::{
    ClusterApi, Inventory, TagOutcome, TagSelection, add_tag, format_tags, resolve_tag_targets,
};
use drowse_host_pve::PveClient;
use drowse_util::{NodeName, WorkloadId, default_config_path};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// drowse-tag - Manage workload tags used by drowsed
#[derive(Parser, Debug)]
#[command(name = "drowse-tag")]
#[command(about = "List workload tags or mark workloads as safe to shut down", long_about = None)]
struct Args {
    /// Configuration file path (API settings are read from it)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// List every workload in the cluster with its tags
    #[arg(long, conflicts_with = "tag")]
    list: bool,

    /// Tag to add
    #[arg(long)]
    tag: Option<String>,

    /// Workload ids to tag
    #[arg(long, num_args = 1.., conflicts_with = "all")]
    vmids: Vec<u32>,

    /// Restrict to one node (required with --all)
    #[arg(long)]
    node: Option<String>,

    /// Tag every workload on --node
    #[arg(long, requires = "node")]
    all: bool,
}

#[derive(Debug, Default)]
struct Tally {
    added: usize,
    skipped: usize,
    failed: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(true)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Ok(false) when at least one workload could not be tagged
async fn run(args: Args) -> Result<bool> {
    let policy = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    let client = PveClient::new(&policy.api).context("Failed to create Proxmox client")?;

    if args.list {
        list(&client).await?;
        return Ok(true);
    }

    let Some(tag) = args.tag else {
        bail!("nothing to do: pass --list, or --tag with --vmids or --node/--all");
    };
    check_tag(&tag).map_err(|e| anyhow::anyhow!("invalid tag '{}': {}", tag, e))?;

    let node = args.node.map(NodeName::new);
    let ids: Vec<WorkloadId> = args.vmids.iter().copied().map(WorkloadId::new).collect();
    let selection = match (&node, args.all) {
        (Some(node), true) => TagSelection::AllOn(node),
        (_, false) if !ids.is_empty() => TagSelection::Ids {
            ids: &ids,
            node: node.as_ref(),
        },
        _ => bail!("--tag needs --vmids, or --node with --all"),
    };

    let targets = resolve_tag_targets(&client, selection)
        .await
        .context("Failed to list workloads")?;
    for (node, e) in &targets.unreachable {
        eprintln!("warning: could not list workloads on {}: {}", node, e);
    }

    let mut tally = Tally {
        failed: targets.missing.len(),
        ..Default::default()
    };
    for id in &targets.missing {
        println!("✗ {}: not found", id);
    }

    for (node, workload) in &targets.found {
        match add_tag(&client, node, workload, &tag).await {
            Ok(TagOutcome::Added) => {
                tally.added += 1;
                println!("✓ {} {} ({}) on {}: tagged '{}'", workload.kind, workload.id, workload.display_name(), node, tag);
            }
            Ok(TagOutcome::AlreadyPresent) => {
                tally.skipped += 1;
                println!("= {} {} ({}) on {}: already tagged", workload.kind, workload.id, workload.display_name(), node);
            }
            Err(e) => {
                tally.failed += 1;
                println!("✗ {} {} on {}: {}", workload.kind, workload.id, node, e);
            }
        }
    }

    println!();
    println!(
        "Tagged {}, already tagged {}, failed {}",
        tally.added, tally.skipped, tally.failed
    );

    Ok(tally.failed == 0)
}

async fn list(api: &dyn ClusterApi) -> Result<()> {
    let inventory = Inventory::collect_cluster(api)
        .await
        .context("Failed to list cluster nodes")?;

    let mut current: Option<&NodeName> = None;
    for (node, workload) in inventory.entries() {
        if current != Some(node) {
            println!();
            println!("Node {}:", node);
            current = Some(node);
        }
        let tags = if workload.tags.is_empty() {
            "-".to_string()
        } else {
            format_tags(&workload.tags)
        };
        println!(
            "  {:>6}  {:<9}  {:<8}  {:<24}  {}",
            workload.id.to_string(),
            workload.kind.to_string(),
            workload.status.to_string(),
            workload.display_name(),
            tags
        );
    }

    for (node, e) in &inventory.failed_nodes {
        eprintln!("warning: could not list workloads on {}: {}", node, e);
    }

    if inventory.is_empty() {
        println!("No workloads found");
    }
    Ok(())
}
