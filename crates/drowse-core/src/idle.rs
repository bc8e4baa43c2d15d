//! Idle detection: is a node safe to shut down?

use drowse_host_api::{ClusterApi, Workload};
use drowse_util::{DrowseError, NodeName, Result};

/// A workload blocks node shutdown when it runs without the safe-shutdown tag
pub fn is_critical(workload: &Workload, safe_tag: &str) -> bool {
    workload.is_running() && !workload.has_tag(safe_tag)
}

/// Result of checking one node
#[derive(Debug, Clone, Default)]
pub struct IdleAssessment {
    /// Running workloads without the safe-shutdown tag
    pub critical: Vec<Workload>,
}

impl IdleAssessment {
    /// Idle means nothing critical is running (an empty node is idle)
    pub fn is_idle(&self) -> bool {
        self.critical.is_empty()
    }
}

pub fn classify(workloads: &[Workload], safe_tag: &str) -> IdleAssessment {
    IdleAssessment {
        critical: workloads
            .iter()
            .filter(|w| is_critical(w, safe_tag))
            .cloned()
            .collect(),
    }
}

/// List the node's workloads and classify them.
///
/// A failed listing is returned as `TransientQuery`; callers treat the
/// node as not idle for that tick.
pub async fn evaluate(api: &dyn ClusterApi, node: &NodeName, safe_tag: &str) -> Result<IdleAssessment> {
    let workloads = api
        .list_workloads(node)
        .await
        .map_err(|e| DrowseError::query(node, e.to_string()))?;
    Ok(classify(&workloads, safe_tag))
}
