//! Mock cluster for testing

use async_trait::async_trait;
use drowse_util::{NodeName, WorkloadId};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    ApiError, ApiErrorKind, ApiResult, ClusterApi, LocalPower, NodeInfo, NodeStatus, Workload,
    WorkloadRef, WorkloadStatus,
};

/// A call observed by the mock, in dispatch order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    WorkloadShutdown(WorkloadRef),
    NodeShutdown(NodeName),
    SetTags(WorkloadRef),
}

#[derive(Debug, Default)]
struct MockNode {
    uptime: Duration,
    online: bool,
    workloads: Vec<Workload>,
}

#[derive(Debug, Default)]
struct MockState {
    nodes: BTreeMap<NodeName, MockNode>,
    calls: Vec<MockCall>,
    fail_list_nodes: Option<ApiErrorKind>,
    fail_status: HashSet<NodeName>,
    fail_list: HashSet<NodeName>,
    forbidden: HashSet<NodeName>,
    fail_workload_shutdown: HashSet<WorkloadId>,
    fail_node_shutdown: HashSet<NodeName>,
}

/// In-memory cluster for unit/integration testing
pub struct MockCluster {
    state: Arc<Mutex<MockState>>,
    status_calls: AtomicU32,

    /// Delay applied to every workload shutdown call
    pub shutdown_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            status_calls: AtomicU32::new(0),
            shutdown_delay: Arc::new(Mutex::new(None)),
        }
    }

    pub fn add_node(&self, name: &str, uptime_secs: u64) {
        self.state.lock().unwrap().nodes.insert(
            NodeName::new(name),
            MockNode {
                uptime: Duration::from_secs(uptime_secs),
                online: true,
                workloads: Vec::new(),
            },
        );
    }

    pub fn add_workload(&self, node: &str, workload: Workload) {
        let mut state = self.state.lock().unwrap();
        let entry = state.nodes.entry(NodeName::new(node)).or_insert_with(|| MockNode {
            online: true,
            ..Default::default()
        });
        entry.workloads.retain(|w| w.id != workload.id);
        entry.workloads.push(workload);
    }

    /// Current copy of one workload
    pub fn workload(&self, node: &NodeName, id: WorkloadId) -> Option<Workload> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .get(node)
            .and_then(|n| n.workloads.iter().find(|w| w.id == id).cloned())
    }

    pub fn fail_list_nodes(&self, kind: ApiErrorKind) {
        self.state.lock().unwrap().fail_list_nodes = Some(kind);
    }

    pub fn fail_node_status(&self, node: &str) {
        self.state.lock().unwrap().fail_status.insert(NodeName::new(node));
    }

    pub fn fail_list_workloads(&self, node: &str) {
        self.state.lock().unwrap().fail_list.insert(NodeName::new(node));
    }

    /// Answer every read on `node` with HTTP 403
    pub fn forbid_node(&self, node: &str) {
        self.state.lock().unwrap().forbidden.insert(NodeName::new(node));
    }

    pub fn fail_workload_shutdown(&self, id: u32) {
        self.state
            .lock()
            .unwrap()
            .fail_workload_shutdown
            .insert(WorkloadId::new(id));
    }

    pub fn fail_node_shutdown(&self, node: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_node_shutdown
            .insert(NodeName::new(node));
    }

    /// Clear every injected failure
    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_list_nodes = None;
        state.fail_status.clear();
        state.fail_list.clear();
        state.forbidden.clear();
        state.fail_workload_shutdown.clear();
        state.fail_node_shutdown.clear();
    }

    pub fn set_shutdown_delay(&self, delay: Option<Duration>) {
        *self.shutdown_delay.lock().unwrap() = delay;
    }

    /// All recorded power/tag calls in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Ids of workloads a shutdown was dispatched to, in dispatch order
    pub fn shutdown_requests(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::WorkloadShutdown(target) => Some(target.id.get()),
                _ => None,
            })
            .collect()
    }

    /// Nodes a remote power-off was requested for
    pub fn node_shutdowns(&self) -> Vec<NodeName> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::NodeShutdown(node) => Some(node),
                _ => None,
            })
            .collect()
    }

    /// Number of node status reads so far
    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn check_read(state: &MockState, node: &NodeName, failing: &HashSet<NodeName>) -> ApiResult<()> {
        if state.forbidden.contains(node) {
            return Err(ApiError::forbidden(format!(
                "Permission check failed (/nodes/{})",
                node
            )));
        }
        if failing.contains(node) {
            return Err(ApiError::transport("Mock read failure"));
        }
        if !state.nodes.contains_key(node) {
            return Err(ApiError::not_found(format!("no such node '{}'", node)));
        }
        Ok(())
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn list_nodes(&self) -> ApiResult<Vec<NodeInfo>> {
        let state = self.state.lock().unwrap();
        if let Some(kind) = state.fail_list_nodes {
            return Err(ApiError::new(kind, "Mock node listing failure"));
        }
        Ok(state
            .nodes
            .iter()
            .map(|(name, n)| NodeInfo {
                name: name.clone(),
                status: if n.online { "online" } else { "offline" }.to_string(),
            })
            .collect())
    }

    async fn node_status(&self, node: &NodeName) -> ApiResult<NodeStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Self::check_read(&state, node, &state.fail_status)?;
        Ok(NodeStatus {
            uptime: state.nodes[node].uptime,
        })
    }

    async fn list_workloads(&self, node: &NodeName) -> ApiResult<Vec<Workload>> {
        let state = self.state.lock().unwrap();
        Self::check_read(&state, node, &state.fail_list)?;
        Ok(state.nodes[node].workloads.clone())
    }

    async fn shutdown_workload(&self, target: &WorkloadRef, _timeout: Duration) -> ApiResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(MockCall::WorkloadShutdown(target.clone()));
            if state.fail_workload_shutdown.contains(&target.id) {
                return Err(ApiError::new(
                    ApiErrorKind::Api { status: 500 },
                    "Mock shutdown failure",
                ));
            }
        }

        let delay = *self.shutdown_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        let workload = state
            .nodes
            .get_mut(&target.node)
            .and_then(|n| n.workloads.iter_mut().find(|w| w.id == target.id));
        match workload {
            Some(w) => {
                w.status = WorkloadStatus::Stopped;
                Ok(())
            }
            None => Err(ApiError::not_found(format!("{} does not exist", target))),
        }
    }

    async fn shutdown_node(&self, node: &NodeName) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::NodeShutdown(node.clone()));
        if state.fail_node_shutdown.contains(node) {
            return Err(ApiError::forbidden("Permission check failed (Sys.PowerMgmt)"));
        }
        if let Some(n) = state.nodes.get_mut(node) {
            n.online = false;
        }
        Ok(())
    }

    async fn set_tags(&self, target: &WorkloadRef, tags: &BTreeSet<String>) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::SetTags(target.clone()));
        let workload = state
            .nodes
            .get_mut(&target.node)
            .and_then(|n| n.workloads.iter_mut().find(|w| w.id == target.id));
        match workload {
            Some(w) => {
                w.tags = tags.clone();
                Ok(())
            }
            None => Err(ApiError::not_found(format!("{} does not exist", target))),
        }
    }
}

/// Mock local power control
#[derive(Default)]
pub struct MockLocalPower {
    power_offs: AtomicU32,
    fail: Mutex<bool>,
}

impl MockLocalPower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn power_off_count(&self) -> u32 {
        self.power_offs.load(Ordering::SeqCst)
    }

    /// Make every later power-off fail
    pub fn fail_power_off(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl LocalPower for MockLocalPower {
    async fn power_off(&self) -> ApiResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(ApiError::new(
                ApiErrorKind::LocalCommand,
                "Mock local power-off failure",
            ));
        }
        self.power_offs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkloadKind;

    #[tokio::test]
    async fn mock_shutdown_stops_workload() {
        let mock = MockCluster::new();
        mock.add_node("pve01", 1200);
        mock.add_workload(
            "pve01",
            Workload::new(100, WorkloadKind::Vm, WorkloadStatus::Running),
        );

        let node = NodeName::new("pve01");
        let target = WorkloadRef::new(node.clone(), WorkloadId::new(100), WorkloadKind::Vm);
        mock.shutdown_workload(&target, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(mock.shutdown_requests(), vec![100]);
        let w = mock.workload(&node, WorkloadId::new(100)).unwrap();
        assert_eq!(w.status, WorkloadStatus::Stopped);
    }

    #[tokio::test]
    async fn forbidden_node_returns_permission_error() {
        let mock = MockCluster::new();
        mock.add_node("pve01", 1200);
        mock.forbid_node("pve01");

        let err = mock.list_workloads(&NodeName::new("pve01")).await.unwrap_err();
        assert!(err.is_permission());

        mock.heal();
        assert!(mock.list_workloads(&NodeName::new("pve01")).await.is_ok());
    }

    #[tokio::test]
    async fn failed_shutdown_is_still_recorded() {
        let mock = MockCluster::new();
        mock.add_node("pve01", 1200);
        mock.fail_workload_shutdown(101);

        let target = WorkloadRef::new(
            NodeName::new("pve01"),
            WorkloadId::new(101),
            WorkloadKind::Container,
        );
        assert!(mock
            .shutdown_workload(&target, Duration::from_secs(60))
            .await
            .is_err());
        assert_eq!(mock.shutdown_requests(), vec![101]);
    }
}
