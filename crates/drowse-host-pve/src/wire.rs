//! Proxmox API response shapes
//!
//! Every response is wrapped as `{"data": ...}`.

use drowse_host_api::{
    ApiError, ApiErrorKind, ApiResult, NodeInfo, NodeStatus, Workload, WorkloadKind,
    WorkloadStatus, parse_tags,
};
use drowse_util::{NodeName, WorkloadId};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NodeEntry {
    node: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NodeStatusEntry {
    #[serde(default)]
    uptime: u64,
}

/// LXC listings report `vmid` as a string on some releases
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVmid {
    Number(u32),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct GuestEntry {
    vmid: RawVmid,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    tags: Option<String>,
}

/// Unwrap the `data` member of a response body
pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(|e| e.data)
        .map_err(|e| ApiError::new(ApiErrorKind::Decode, e.to_string()))
}

/// Classify a non-success HTTP status
pub(crate) fn status_error(status: u16, body: &str) -> ApiError {
    let kind = match status {
        401 => ApiErrorKind::Unauthorized,
        403 => ApiErrorKind::Forbidden,
        404 => ApiErrorKind::NotFound,
        other => ApiErrorKind::Api { status: other },
    };
    let message = body.trim();
    let message = if message.is_empty() {
        format!("HTTP {}", status)
    } else {
        message.to_string()
    };
    ApiError::new(kind, message)
}

impl From<NodeEntry> for NodeInfo {
    fn from(entry: NodeEntry) -> Self {
        NodeInfo {
            name: NodeName::new(entry.node),
            status: entry.status.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl From<NodeStatusEntry> for NodeStatus {
    fn from(entry: NodeStatusEntry) -> Self {
        NodeStatus {
            uptime: Duration::from_secs(entry.uptime),
        }
    }
}

impl GuestEntry {
    pub(crate) fn into_workload(self, kind: WorkloadKind) -> ApiResult<Workload> {
        let id = match self.vmid {
            RawVmid::Number(id) => id,
            RawVmid::Text(s) => s.parse().map_err(|_| {
                ApiError::new(ApiErrorKind::Decode, format!("invalid vmid '{}'", s))
            })?,
        };

        Ok(Workload {
            id: WorkloadId::new(id),
            kind,
            name: self.name.unwrap_or_default(),
            status: WorkloadStatus::parse(self.status.as_deref().unwrap_or("unknown")),
            tags: self.tags.as_deref().map(parse_tags).unwrap_or_default(),
        })
    }
}
