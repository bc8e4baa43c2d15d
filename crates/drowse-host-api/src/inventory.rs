//! Point-in-time snapshot of workloads across nodes

use drowse_util::{NodeName, WorkloadId};
use tracing::debug;

use crate::{ApiError, ApiResult, ClusterApi, Workload, WorkloadRef};

/// Workloads across a set of nodes, read in one pass.
///
/// Snapshots are taken per operation and dropped afterwards.
#[derive(Debug, Default)]
pub struct Inventory {
    entries: Vec<(NodeName, Workload)>,
    /// Nodes whose workload listing failed
    pub failed_nodes: Vec<(NodeName, ApiError)>,
}

impl Inventory {
    /// Read every workload on the given nodes. A node that fails to list is
    /// recorded in `failed_nodes` and skipped.
    pub async fn collect(api: &dyn ClusterApi, nodes: &[NodeName]) -> Self {
        let mut inventory = Self::default();

        for node in nodes {
            match api.list_workloads(node).await {
                Ok(workloads) => {
                    debug!(node = %node, count = workloads.len(), "Listed workloads");
                    inventory
                        .entries
                        .extend(workloads.into_iter().map(|w| (node.clone(), w)));
                }
                Err(e) => inventory.failed_nodes.push((node.clone(), e)),
            }
        }

        inventory
    }

    /// Read every workload on every node in the cluster
    pub async fn collect_cluster(api: &dyn ClusterApi) -> ApiResult<Self> {
        let nodes: Vec<NodeName> = api
            .list_nodes()
            .await?
            .into_iter()
            .map(|n| n.name)
            .collect();
        Ok(Self::collect(api, &nodes).await)
    }

    /// The node hosting `id`, with the workload as listed
    pub fn get(&self, id: WorkloadId) -> Option<(&NodeName, &Workload)> {
        self.entries
            .iter()
            .find(|(_, w)| w.id == id)
            .map(|(node, w)| (node, w))
    }

    pub fn find(&self, id: WorkloadId) -> Option<WorkloadRef> {
        self.get(id).map(|(node, w)| WorkloadRef::of(node, w))
    }

    pub fn entries(&self) -> &[(NodeName, Workload)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Which workloads a tagging run applies to
#[derive(Debug, Clone, Copy)]
pub enum TagSelection<'a> {
    /// Listed ids, looked up on one node or across the cluster
    Ids {
        ids: &'a [WorkloadId],
        node: Option<&'a NodeName>,
    },
    /// Every workload on one node
    AllOn(&'a NodeName),
}

/// Workloads resolved for tagging
#[derive(Debug, Default)]
pub struct TagTargets {
    pub found: Vec<(NodeName, Workload)>,
    /// Requested ids that no listed node hosts
    pub missing: Vec<WorkloadId>,
    /// Nodes skipped during a cluster-wide lookup
    pub unreachable: Vec<(NodeName, ApiError)>,
}

/// Resolve a selection against the cluster.
///
/// Fails when the cluster or the one named node cannot be listed.
pub async fn resolve_tag_targets(
    api: &dyn ClusterApi,
    selection: TagSelection<'_>,
) -> ApiResult<TagTargets> {
    let (mut inventory, ids) = match selection {
        TagSelection::AllOn(node) => (collect_one(api, node).await?, None),
        TagSelection::Ids {
            ids,
            node: Some(node),
        } => (collect_one(api, node).await?, Some(ids)),
        TagSelection::Ids { ids, node: None } => (Inventory::collect_cluster(api).await?, Some(ids)),
    };

    let mut targets = TagTargets {
        unreachable: std::mem::take(&mut inventory.failed_nodes),
        ..Default::default()
    };

    match ids {
        None => targets.found = inventory.entries,
        Some(ids) => {
            for &id in ids {
                match inventory.get(id) {
                    Some((node, workload)) => targets.found.push((node.clone(), workload.clone())),
                    None => targets.missing.push(id),
                }
            }
        }
    }

    Ok(targets)
}

async fn collect_one(api: &dyn ClusterApi, node: &NodeName) -> ApiResult<Inventory> {
    let mut inventory = Inventory::collect(api, std::slice::from_ref(node)).await;
    match inventory.failed_nodes.pop() {
        Some((_, e)) => Err(e),
        None => Ok(inventory),
    }
}

/// Outcome of adding a tag to one workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    Added,
    AlreadyPresent,
}

/// Add `tag` to a workload's tag set, keeping its existing tags
pub async fn add_tag(
    api: &dyn ClusterApi,
    node: &NodeName,
    workload: &Workload,
    tag: &str,
) -> ApiResult<TagOutcome> {
    if workload.has_tag(tag) {
        return Ok(TagOutcome::AlreadyPresent);
    }

    let mut tags = workload.tags.clone();
    tags.insert(tag.to_string());
    api.set_tags(&WorkloadRef::of(node, workload), &tags).await?;
    Ok(TagOutcome::Added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockCluster, WorkloadKind, WorkloadStatus};

    fn cluster() -> MockCluster {
        let mock = MockCluster::new();
        mock.add_node("pve01", 3600);
        mock.add_node("pve02", 3600);
        mock.add_workload(
            "pve01",
            Workload::new(100, WorkloadKind::Vm, WorkloadStatus::Running),
        );
        mock.add_workload(
            "pve02",
            Workload::new(200, WorkloadKind::Container, WorkloadStatus::Stopped)
                .with_tag("backup"),
        );
        mock
    }

    #[tokio::test]
    async fn finds_workload_on_its_node() {
        let mock = cluster();
        let inventory = Inventory::collect_cluster(&mock).await.unwrap();

        let found = inventory.find(WorkloadId::new(200)).unwrap();
        assert_eq!(found.node.as_str(), "pve02");
        assert_eq!(found.kind, WorkloadKind::Container);
        assert!(inventory.find(WorkloadId::new(999)).is_none());
    }

    #[tokio::test]
    async fn failing_node_is_recorded_and_skipped() {
        let mock = cluster();
        mock.fail_list_workloads("pve01");

        let inventory = Inventory::collect_cluster(&mock).await.unwrap();
        assert_eq!(inventory.entries().len(), 1);
        assert_eq!(inventory.failed_nodes.len(), 1);
        assert_eq!(inventory.failed_nodes[0].0.as_str(), "pve01");
    }

    #[tokio::test]
    async fn add_tag_keeps_existing_tags() {
        let mock = cluster();
        let node = NodeName::new("pve02");
        let workload = mock.workload(&node, WorkloadId::new(200)).unwrap();

        let outcome = add_tag(&mock, &node, &workload, "safe-shutdown").await.unwrap();
        assert_eq!(outcome, TagOutcome::Added);

        let updated = mock.workload(&node, WorkloadId::new(200)).unwrap();
        assert!(updated.has_tag("backup"));
        assert!(updated.has_tag("safe-shutdown"));

        let outcome = add_tag(&mock, &node, &updated, "safe-shutdown").await.unwrap();
        assert_eq!(outcome, TagOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn ids_resolve_across_nodes() {
        let mock = cluster();
        let ids = [WorkloadId::new(200), WorkloadId::new(999), WorkloadId::new(100)];

        let targets = resolve_tag_targets(&mock, TagSelection::Ids { ids: &ids, node: None })
            .await
            .unwrap();

        let found: Vec<(&str, u32)> = targets
            .found
            .iter()
            .map(|(node, w)| (node.as_str(), w.id.get()))
            .collect();
        assert_eq!(found, vec![("pve02", 200), ("pve01", 100)]);
        assert_eq!(targets.missing, vec![WorkloadId::new(999)]);
        assert!(targets.unreachable.is_empty());
    }

    #[tokio::test]
    async fn ids_limited_to_named_node() {
        let mock = cluster();
        let node = NodeName::new("pve01");
        let ids = [WorkloadId::new(100), WorkloadId::new(200)];

        let targets = resolve_tag_targets(
            &mock,
            TagSelection::Ids {
                ids: &ids,
                node: Some(&node),
            },
        )
        .await
        .unwrap();

        assert_eq!(targets.found.len(), 1);
        assert_eq!(targets.missing, vec![WorkloadId::new(200)]);
    }

    #[tokio::test]
    async fn all_on_node_takes_every_workload() {
        let mock = cluster();
        mock.add_workload(
            "pve01",
            Workload::new(101, WorkloadKind::Container, WorkloadStatus::Stopped),
        );
        let node = NodeName::new("pve01");

        let targets = resolve_tag_targets(&mock, TagSelection::AllOn(&node))
            .await
            .unwrap();

        assert_eq!(targets.found.len(), 2);
        assert!(targets.found.iter().all(|(n, _)| n == &node));
        assert!(targets.missing.is_empty());
    }

    #[tokio::test]
    async fn named_node_listing_failure_is_error() {
        let mock = cluster();
        mock.forbid_node("pve01");
        let node = NodeName::new("pve01");

        let err = resolve_tag_targets(&mock, TagSelection::AllOn(&node))
            .await
            .unwrap_err();
        assert!(err.is_permission());
    }

    #[tokio::test]
    async fn cluster_lookup_skips_failing_node() {
        let mock = cluster();
        mock.fail_list_workloads("pve01");
        let ids = [WorkloadId::new(100), WorkloadId::new(200)];

        let targets = resolve_tag_targets(&mock, TagSelection::Ids { ids: &ids, node: None })
            .await
            .unwrap();

        assert_eq!(targets.found.len(), 1);
        assert_eq!(targets.missing, vec![WorkloadId::new(100)]);
        assert_eq!(targets.unreachable.len(), 1);
        assert_eq!(targets.unreachable[0].0.as_str(), "pve01");
    }
}
