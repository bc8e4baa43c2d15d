//! Startup checks: policy bounds and API access

use drowse_config::{MIN_CHECK_INTERVAL_SECS, MIN_GRACE_PERIOD_SECS, Policy};
use drowse_host_api::{ApiError, ClusterApi, Privilege};
use drowse_util::{DrowseError, NodeName, Result};
use std::time::Duration;
use tracing::{error, info, warn};

const RECOMMENDED_MIN_UPTIME: Duration = Duration::from_secs(60);

/// Findings of a successful preflight
#[derive(Debug, Default)]
pub struct PreflightReport {
    /// Nodes the token can see
    pub nodes: Vec<NodeName>,
    pub warnings: Vec<String>,
}

#[derive(Default)]
struct Findings {
    nodes: Vec<NodeName>,
    offline: Vec<NodeName>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl Findings {
    fn api_failure(&mut self, what: String, privilege: Privilege, e: &ApiError) {
        if e.is_permission() {
            self.errors
                .push(format!("{}: {} (requires {})", what, e, privilege));
        } else {
            self.warnings.push(format!("{}: {}", what, e));
        }
    }
}

/// Validate bounds and probe the API once before the loop starts.
///
/// Authorization failures refuse startup; anything else is a warning.
pub async fn preflight(api: &dyn ClusterApi, policy: &Policy) -> Result<PreflightReport> {
    let mut findings = Findings::default();

    if policy.check_interval < Duration::from_secs(MIN_CHECK_INTERVAL_SECS) {
        return Err(DrowseError::config(format!(
            "check_interval too short (minimum {}s)",
            MIN_CHECK_INTERVAL_SECS
        )));
    }
    if policy.grace_period < Duration::from_secs(MIN_GRACE_PERIOD_SECS) {
        return Err(DrowseError::config(format!(
            "grace_period too short (minimum {}s)",
            MIN_GRACE_PERIOD_SECS
        )));
    }
    if policy.min_uptime < RECOMMENDED_MIN_UPTIME {
        findings.warnings.push(format!(
            "min_uptime is {}s; at least 300s is recommended",
            policy.min_uptime.as_secs()
        ));
    }

    info!("Checking Proxmox API access and privileges");
    probe(api, &mut findings).await;

    for node in &policy.monitored_nodes {
        if !findings.nodes.is_empty() && !findings.nodes.contains(node) {
            findings
                .warnings
                .push(format!("monitored node '{}' not found in cluster", node));
        } else if findings.offline.contains(node) {
            findings
                .warnings
                .push(format!("monitored node '{}' is not online", node));
        }
    }

    for privilege in Privilege::ALL.iter().filter(|p| !p.is_probeable()) {
        findings.warnings.push(format!(
            "{} cannot be verified without side effects",
            privilege
        ));
    }

    for warning in &findings.warnings {
        warn!("{}", warning);
    }

    if !findings.errors.is_empty() {
        error!("Preflight check failed");
        for e in &findings.errors {
            error!("  {}", e);
        }
        info!("The API token needs these privileges:");
        for privilege in Privilege::ALL {
            info!("  {}", privilege);
        }
        return Err(DrowseError::permission(findings.errors.join("; ")));
    }

    info!(nodes = ?findings.nodes, "Proxmox API access validated");

    Ok(PreflightReport {
        nodes: findings.nodes,
        warnings: findings.warnings,
    })
}

async fn probe(api: &dyn ClusterApi, findings: &mut Findings) {
    let nodes = match api.list_nodes().await {
        Ok(nodes) => nodes,
        Err(e) => {
            findings.api_failure("list nodes".into(), Privilege::SysAudit, &e);
            return;
        }
    };

    for node in nodes {
        if !node.is_online() {
            findings.offline.push(node.name.clone());
        }
        if let Err(e) = api.node_status(&node.name).await {
            findings.api_failure(
                format!("read status of node {}", node.name),
                Privilege::SysAudit,
                &e,
            );
        }
        if let Err(e) = api.list_workloads(&node.name).await {
            findings.api_failure(
                format!("list workloads on node {}", node.name),
                Privilege::VmAudit,
                &e,
            );
        }
        findings.nodes.push(node.name);
    }
}
