//! Shutdown orchestration: node-triggered sequences and the fleet cascade

use drowse_config::{Policy, ShutdownStage};
use drowse_host_api::{ApiResult, ClusterApi, Inventory, LocalPower, Workload, WorkloadRef};
use drowse_util::{DrowseError, NodeName, Result, WorkloadId, format_duration};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of one workload shutdown request
#[derive(Debug)]
pub struct DispatchOutcome {
    pub target: WorkloadRef,
    pub result: ApiResult<()>,
}

/// Per-item outcomes of a concurrent batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<DispatchOutcome>,
}

impl BatchReport {
    pub fn dispatched(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// How the node itself was powered off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOff {
    /// OS shutdown of the host we run on
    Local,
    /// API power command
    Remote,
    /// Logged only
    DryRun,
}

impl fmt::Display for PowerOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
            Self::DryRun => write!(f, "dry-run"),
        }
    }
}

/// Outcome of a node-triggered sequence that reached the power-off step
#[derive(Debug)]
pub struct SequenceReport {
    pub node: NodeName,
    pub batch: BatchReport,
    pub power_off: PowerOff,
}

/// Outcome of one cascade stage
#[derive(Debug, Default)]
pub struct StageReport {
    pub name: String,
    pub batch: BatchReport,
    /// Ids that could not be located in the cluster
    pub unresolved: Vec<(WorkloadId, String)>,
}

impl StageReport {
    pub fn failed(&self) -> usize {
        self.batch.failed() + self.unresolved.len()
    }
}

#[derive(Debug, Default)]
pub struct CascadeReport {
    pub stages: Vec<StageReport>,
}

impl CascadeReport {
    pub fn dispatched(&self) -> usize {
        self.stages.iter().map(|s| s.batch.dispatched()).sum()
    }

    pub fn failed(&self) -> usize {
        self.stages.iter().map(StageReport::failed).sum()
    }
}

/// Carries out shutdowns against the cluster
pub struct Orchestrator {
    api: Arc<dyn ClusterApi>,
    local: Arc<dyn LocalPower>,
    policy: Arc<Policy>,
}

impl Orchestrator {
    pub fn new(api: Arc<dyn ClusterApi>, local: Arc<dyn LocalPower>, policy: Arc<Policy>) -> Self {
        Self { api, local, policy }
    }

    /// Running, tagged, non-excluded workloads may be stopped by the sequence
    fn is_shutdown_target(&self, workload: &Workload) -> bool {
        workload.is_running()
            && workload.has_tag(&self.policy.safe_shutdown_tag)
            && !self.policy.is_excluded(workload.id)
    }

    /// Stop the node's tagged workloads, then power the node off.
    ///
    /// Bounded by the sequence timeout; an expired sequence is abandoned
    /// without retry.
    pub async fn shutdown_node(&self, node: &NodeName) -> Result<SequenceReport> {
        let timeout = self.policy.timing.sequence_timeout;
        warn!(node = %node, timeout = %format_duration(timeout), "Starting node shutdown sequence");

        match tokio::time::timeout(timeout, self.run_sequence(node)).await {
            Ok(result) => result,
            Err(_) => {
                error!(node = %node, timeout_secs = timeout.as_secs(), "Node shutdown sequence timed out");
                Err(DrowseError::SequenceTimeout {
                    node: node.clone(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    async fn run_sequence(&self, node: &NodeName) -> Result<SequenceReport> {
        let workloads = self
            .api
            .list_workloads(node)
            .await
            .map_err(|e| DrowseError::query(node, e.to_string()))?;

        let targets: Vec<WorkloadRef> = workloads
            .iter()
            .filter(|w| self.is_shutdown_target(w))
            .map(|w| WorkloadRef::of(node, w))
            .collect();

        let batch = self.dispatch_batch(targets).await;

        if !batch.is_empty() {
            if batch.failed() > 0 {
                warn!(
                    node = %node,
                    failed = batch.failed(),
                    total = batch.dispatched(),
                    "Some workloads could not be shut down"
                );
            }
            let settle = self.policy.timing.settle_delay;
            info!(node = %node, wait = %format_duration(settle), "Waiting for workload shutdowns");
            tokio::time::sleep(settle).await;
        }

        let power_off = self.power_off(node).await?;

        Ok(SequenceReport {
            node: node.clone(),
            batch,
            power_off,
        })
    }

    async fn power_off(&self, node: &NodeName) -> Result<PowerOff> {
        if self.policy.dry_run {
            warn!(node = %node, "DRY-RUN: node power-off skipped");
            return Ok(PowerOff::DryRun);
        }

        if self.policy.is_local(node) {
            warn!(node = %node, "Powering off local node");
            self.local
                .power_off()
                .await
                .map_err(|e| DrowseError::command(format!("local power-off of {}: {}", node, e)))?;
            return Ok(PowerOff::Local);
        }

        warn!(node = %node, "Powering off node via API");
        self.api
            .shutdown_node(node)
            .await
            .map_err(|e| DrowseError::command(format!("power-off of {}: {}", node, e)))?;
        info!(node = %node, "Node power-off command sent");
        Ok(PowerOff::Remote)
    }

    /// Request every shutdown at once and wait for all of them. One failure
    /// never cancels the others.
    pub async fn dispatch_batch(&self, targets: Vec<WorkloadRef>) -> BatchReport {
        if targets.is_empty() {
            return BatchReport::default();
        }

        info!(count = targets.len(), "Dispatching workload shutdowns");
        let timeout = self.policy.timing.workload_timeout;

        let requests = targets.into_iter().map(|target| async move {
            info!(node = %target.node, vmid = target.id.get(), kind = %target.kind, "Shutting down workload");
            let result = self.api.shutdown_workload(&target, timeout).await;
            match &result {
                Ok(()) => debug!(vmid = target.id.get(), "Shutdown requested"),
                Err(e) => error!(
                    node = %target.node,
                    vmid = target.id.get(),
                    error = %e,
                    "Workload shutdown failed"
                ),
            }
            DispatchOutcome { target, result }
        });

        BatchReport {
            outcomes: join_all(requests).await,
        }
    }

    /// Fleet-wide shutdown: ordered stages when configured, otherwise one
    /// unordered pass over the monitored nodes. Nodes are not powered off.
    pub async fn run_cascade(&self) -> CascadeReport {
        if self.policy.stages.is_empty() {
            info!("Starting unordered cascade");
            self.run_unordered().await
        } else {
            info!(stages = self.policy.stages.len(), "Starting ordered cascade");
            let mut report = CascadeReport::default();
            for stage in &self.policy.stages {
                report.stages.push(self.run_stage(stage).await);
            }
            report
        }
    }

    async fn run_stage(&self, stage: &ShutdownStage) -> StageReport {
        let mut report = StageReport {
            name: stage.name.clone(),
            ..Default::default()
        };

        let ids: Vec<WorkloadId> = stage
            .workloads
            .iter()
            .copied()
            .filter(|id| {
                let excluded = self.policy.is_excluded(*id);
                if excluded {
                    debug!(stage = %stage.name, vmid = id.get(), "Skipping excluded workload");
                }
                !excluded
            })
            .collect();

        info!(stage = %stage.name, vmids = ?ids, "Shutdown stage");

        if !ids.is_empty() {
            // Locations are read fresh; workloads may have migrated since the last stage
            match Inventory::collect_cluster(self.api.as_ref()).await {
                Ok(inventory) => {
                    let mut targets = Vec::new();
                    for id in ids {
                        match inventory.find(id) {
                            Some(target) => targets.push(target),
                            None => {
                                error!(stage = %stage.name, vmid = id.get(), "Workload not found in cluster");
                                report.unresolved.push((id, "not found in cluster".into()));
                            }
                        }
                    }
                    report.batch = self.dispatch_batch(targets).await;
                }
                Err(e) => {
                    error!(stage = %stage.name, error = %e, "Failed to list cluster nodes");
                    report
                        .unresolved
                        .extend(ids.into_iter().map(|id| (id, e.to_string())));
                }
            }
        }

        if !stage.wait_after.is_zero() {
            info!(stage = %stage.name, wait = %format_duration(stage.wait_after), "Waiting before next stage");
            tokio::time::sleep(stage.wait_after).await;
        }

        report
    }

    async fn run_unordered(&self) -> CascadeReport {
        let inventory = Inventory::collect(self.api.as_ref(), &self.policy.monitored_nodes).await;

        let mut report = StageReport {
            name: "all".into(),
            ..Default::default()
        };

        for (node, e) in &inventory.failed_nodes {
            error!(node = %node, error = %e, "Failed to list workloads");
        }

        let targets: Vec<WorkloadRef> = inventory
            .entries()
            .iter()
            .filter(|(_, w)| self.is_shutdown_target(w))
            .map(|(node, w)| WorkloadRef::of(node, w))
            .collect();

        report.batch = self.dispatch_batch(targets).await;

        CascadeReport {
            stages: vec![report],
        }
    }
}
