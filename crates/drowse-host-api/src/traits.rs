//! Cluster API traits

use async_trait::async_trait;
use drowse_util::NodeName;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::{NodeInfo, NodeStatus, Workload, WorkloadRef};

/// Classification of a cluster API failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Credentials rejected (HTTP 401)
    Unauthorized,
    /// Authenticated but lacking a privilege (HTTP 403)
    Forbidden,
    /// Node or workload does not exist
    NotFound,
    /// Request did not complete in time
    Timeout,
    /// Connection-level failure (DNS, TLS, refused, reset)
    Transport,
    /// Response could not be decoded
    Decode,
    /// Any other non-success status from the API
    Api { status: u16 },
    /// A local OS command failed
    LocalCommand,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::NotFound => write!(f, "not found"),
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
            Self::Decode => write!(f, "decode"),
            Self::Api { status } => write!(f, "http {}", status),
            Self::LocalCommand => write!(f, "local command"),
        }
    }
}

/// Error from a cluster API operation
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NotFound, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Transport, message)
    }

    /// Whether the failure is an authorization problem rather than a transient one
    pub fn is_permission(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Unauthorized | ApiErrorKind::Forbidden)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Operations the engine needs from the virtualization platform.
///
/// Every call reads fresh state; implementations must not cache workload
/// lists between calls.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List cluster nodes
    async fn list_nodes(&self) -> ApiResult<Vec<NodeInfo>>;

    /// Read node status (uptime)
    async fn node_status(&self, node: &NodeName) -> ApiResult<NodeStatus>;

    /// List all VMs and containers on a node, with tags
    async fn list_workloads(&self, node: &NodeName) -> ApiResult<Vec<Workload>>;

    /// Request a clean guest shutdown, giving the guest `timeout` to comply
    async fn shutdown_workload(&self, target: &WorkloadRef, timeout: Duration) -> ApiResult<()>;

    /// Power off a node through the platform
    async fn shutdown_node(&self, node: &NodeName) -> ApiResult<()>;

    /// Replace the tag set of a workload
    async fn set_tags(&self, target: &WorkloadRef, tags: &BTreeSet<String>) -> ApiResult<()>;
}

/// Power-off of the machine this process runs on
#[async_trait]
pub trait LocalPower: Send + Sync {
    async fn power_off(&self) -> ApiResult<()>;
}
