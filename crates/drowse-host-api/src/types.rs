//! Workload and node data as seen through the cluster API

use drowse_util::{NodeName, WorkloadId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Kind of workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    /// QEMU virtual machine
    Vm,
    /// LXC container
    Container,
}

impl WorkloadKind {
    /// Path segment used by the Proxmox API for this kind
    pub fn api_segment(&self) -> &'static str {
        match self {
            Self::Vm => "qemu",
            Self::Container => "lxc",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vm => write!(f, "vm"),
            Self::Container => write!(f, "container"),
        }
    }
}

/// Power status of a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadStatus {
    Running,
    Stopped,
    Other(String),
}

impl WorkloadStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A VM or container on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub id: WorkloadId,
    pub kind: WorkloadKind,
    pub name: String,
    pub status: WorkloadStatus,
    pub tags: BTreeSet<String>,
}

impl Workload {
    pub fn new(id: u32, kind: WorkloadKind, status: WorkloadStatus) -> Self {
        Self {
            id: WorkloadId::new(id),
            kind,
            name: String::new(),
            status,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Display name, falling back to "unknown" like the Proxmox UI does
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "unknown"
        } else {
            &self.name
        }
    }
}

/// Summary entry from the cluster node listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: NodeName,
    /// "online", "offline", "unknown"
    pub status: String,
}

impl NodeInfo {
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }
}

/// Detailed status of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus {
    pub uptime: Duration,
}

/// Address of a workload for power commands
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadRef {
    pub node: NodeName,
    pub id: WorkloadId,
    pub kind: WorkloadKind,
}

impl WorkloadRef {
    pub fn new(node: NodeName, id: WorkloadId, kind: WorkloadKind) -> Self {
        Self { node, id, kind }
    }

    pub fn of(node: &NodeName, workload: &Workload) -> Self {
        Self {
            node: node.clone(),
            id: workload.id,
            kind: workload.kind,
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} on {}", self.kind, self.id, self.node)
    }
}

/// Split a Proxmox tag string. Entries are `;`-delimited; blanks are dropped.
pub fn parse_tags(raw: &str) -> BTreeSet<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join tags back into the Proxmox wire format
pub fn format_tags(tags: &BTreeSet<String>) -> String {
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tag_string() {
        let tags = parse_tags("safe-shutdown; backup ;;");
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("safe-shutdown"));
        assert!(tags.contains("backup"));

        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn format_tags_is_sorted_and_delimited() {
        let tags = parse_tags("zeta;alpha");
        assert_eq!(format_tags(&tags), "alpha;zeta");
    }

    #[test]
    fn status_parsing() {
        assert!(WorkloadStatus::parse("running").is_running());
        assert_eq!(WorkloadStatus::parse("stopped"), WorkloadStatus::Stopped);
        assert_eq!(
            WorkloadStatus::parse("paused"),
            WorkloadStatus::Other("paused".into())
        );
    }

    #[test]
    fn workload_builder() {
        let w = Workload::new(100, WorkloadKind::Vm, WorkloadStatus::Running)
            .with_tag("safe-shutdown");
        assert!(w.has_tag("safe-shutdown"));
        assert_eq!(w.display_name(), "unknown");
        assert_eq!(WorkloadKind::Container.api_segment(), "lxc");
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&WorkloadKind::Vm).unwrap(), "\"vm\"");
        let kind: WorkloadKind = serde_json::from_str("\"container\"").unwrap();
        assert_eq!(kind, WorkloadKind::Container);
    }
}
