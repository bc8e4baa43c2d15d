//! Validated policy structures

use crate::schema::{RawApiConfig, RawConfig, RawShutdownStage};
use drowse_util::{NodeName, WallClock, WorkloadId, local_hostname};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;
pub const MIN_CHECK_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 60;
pub const MIN_GRACE_PERIOD_SECS: u64 = 10;
pub const DEFAULT_MIN_UPTIME_SECS: u64 = 600;
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 10;
pub const DEFAULT_SAFE_SHUTDOWN_TAG: &str = "safe-shutdown";
pub const DEFAULT_STAGE_WAIT_SECS: u64 = 30;
pub const DEFAULT_WORKLOAD_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 30;
pub const DEFAULT_SEQUENCE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_API_PORT: u16 = 8006;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone)]
pub struct Policy {
    pub enabled: bool,
    pub check_interval: Duration,

    /// Nodes evaluated each tick, in order
    pub monitored_nodes: Vec<NodeName>,

    /// Node this process runs on; its power-off goes through the local OS
    pub local_node: NodeName,

    pub safe_shutdown_tag: String,
    pub grace_period: Duration,
    pub dry_run: bool,
    pub min_uptime: Duration,
    pub max_consecutive_errors: u32,
    pub log_state_changes_only: bool,
    pub excluded: BTreeSet<WorkloadId>,

    pub timing: Timing,

    /// Ordered cascade stages. Empty means the unordered pass.
    pub stages: Vec<ShutdownStage>,

    /// Daily cascade time, if any
    pub shutdown_time: Option<WallClock>,

    pub api: ApiConfig,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self::from_raw_for_host(raw, &local_hostname())
    }

    /// Convert from raw config, treating `local_host` as the machine we run on
    pub fn from_raw_for_host(raw: RawConfig, local_host: &str) -> Self {
        let local_node = NodeName::new(local_host);

        let monitored_nodes = if raw.monitored_nodes.is_empty() {
            vec![local_node.clone()]
        } else {
            raw.monitored_nodes.into_iter().map(NodeName::new).collect()
        };

        // Validation guarantees the range
        let shutdown_time = raw
            .shutdown_time
            .and_then(|t| WallClock::new(t.hour, t.minute));

        Self {
            enabled: raw.enabled.unwrap_or(false),
            check_interval: secs(raw.check_interval, DEFAULT_CHECK_INTERVAL_SECS),
            monitored_nodes,
            local_node,
            safe_shutdown_tag: raw
                .safe_shutdown_tag
                .unwrap_or_else(|| DEFAULT_SAFE_SHUTDOWN_TAG.to_string()),
            grace_period: secs(raw.grace_period, DEFAULT_GRACE_PERIOD_SECS),
            dry_run: raw.dry_run.unwrap_or(true),
            min_uptime: secs(raw.min_uptime, DEFAULT_MIN_UPTIME_SECS),
            max_consecutive_errors: raw
                .max_consecutive_errors
                .unwrap_or(DEFAULT_MAX_CONSECUTIVE_ERRORS),
            log_state_changes_only: raw.log_state_changes_only.unwrap_or(true),
            excluded: raw.excluded_vms.into_iter().map(WorkloadId::new).collect(),
            timing: Timing {
                workload_timeout: secs(raw.workload_timeout, DEFAULT_WORKLOAD_TIMEOUT_SECS),
                settle_delay: secs(raw.settle_delay, DEFAULT_SETTLE_DELAY_SECS),
                sequence_timeout: secs(raw.sequence_timeout, DEFAULT_SEQUENCE_TIMEOUT_SECS),
            },
            stages: raw
                .shutdown_order
                .into_iter()
                .map(ShutdownStage::from_raw)
                .collect(),
            shutdown_time,
            api: ApiConfig::from_raw(raw.api),
        }
    }

    pub fn is_excluded(&self, id: WorkloadId) -> bool {
        self.excluded.contains(&id)
    }

    pub fn is_local(&self, node: &NodeName) -> bool {
        node == &self.local_node
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            monitored_nodes: Vec::new(),
            local_node: NodeName::new("localhost"),
            safe_shutdown_tag: DEFAULT_SAFE_SHUTDOWN_TAG.to_string(),
            grace_period: Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS),
            dry_run: true,
            min_uptime: Duration::from_secs(DEFAULT_MIN_UPTIME_SECS),
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            log_state_changes_only: true,
            excluded: BTreeSet::new(),
            timing: Timing::default(),
            stages: Vec::new(),
            shutdown_time: None,
            api: ApiConfig::from_raw(RawApiConfig::default()),
        }
    }
}

/// Waits and bounds used by shutdown sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Time each guest gets to shut down cleanly
    pub workload_timeout: Duration,
    /// Wait between workload shutdowns and node power-off
    pub settle_delay: Duration,
    /// Bound on one whole node-triggered sequence
    pub sequence_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            workload_timeout: Duration::from_secs(DEFAULT_WORKLOAD_TIMEOUT_SECS),
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_DELAY_SECS),
            sequence_timeout: Duration::from_secs(DEFAULT_SEQUENCE_TIMEOUT_SECS),
        }
    }
}

/// One stage of the ordered cascade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownStage {
    pub name: String,
    pub workloads: Vec<WorkloadId>,
    pub wait_after: Duration,
}

impl ShutdownStage {
    pub fn new(name: impl Into<String>, ids: &[u32], wait_after: Duration) -> Self {
        Self {
            name: name.into(),
            workloads: ids.iter().copied().map(WorkloadId::new).collect(),
            wait_after,
        }
    }

    fn from_raw(raw: RawShutdownStage) -> Self {
        Self {
            name: raw.name,
            workloads: raw.vmids.into_iter().map(WorkloadId::new).collect(),
            wait_after: secs(raw.wait_after, DEFAULT_STAGE_WAIT_SECS),
        }
    }
}

/// Proxmox API connection settings
#[derive(Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub token_name: String,
    pub token_value: String,
    pub verify_ssl: bool,
    pub request_timeout: Duration,
}

impl ApiConfig {
    fn from_raw(raw: RawApiConfig) -> Self {
        Self {
            host: raw.host,
            port: raw.port.unwrap_or(DEFAULT_API_PORT),
            user: raw.user,
            token_name: raw.token_name,
            token_value: raw.token_value,
            verify_ssl: raw.verify_ssl.unwrap_or(true),
            request_timeout: secs(raw.request_timeout, DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn base_url(&self) -> String {
        format!("https://{}:{}/api2/json", self.host, self.port)
    }

    /// Value of the `Authorization` header for API token auth
    pub fn auth_header(&self) -> String {
        format!(
            "PVEAPIToken={}!{}={}",
            self.user, self.token_name, self.token_value
        )
    }
}

// Token value stays out of logs
impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("token_name", &self.token_name)
            .field("token_value", &"<redacted>")
            .field("verify_ssl", &self.verify_ssl)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn secs(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default))
}
