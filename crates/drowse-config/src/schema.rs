//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Master switch; a disabled service exits right after startup (default: false)
    pub enabled: Option<bool>,

    /// Seconds between scheduler ticks (default: 300)
    pub check_interval: Option<u64>,

    /// Nodes to evaluate (default: the local host name)
    #[serde(default)]
    pub monitored_nodes: Vec<String>,

    /// Tag marking a workload as safe to stop (default: "safe-shutdown")
    pub safe_shutdown_tag: Option<String>,

    /// Seconds a node must stay idle before it is shut down (default: 60)
    pub grace_period: Option<u64>,

    /// Log node power-offs instead of performing them (default: true)
    pub dry_run: Option<bool>,

    /// Seconds of node uptime before idle tracking starts (default: 600)
    pub min_uptime: Option<u64>,

    /// Consecutive failing ticks before the service halts (default: 10)
    pub max_consecutive_errors: Option<u32>,

    /// Only log when a node's state changes (default: true)
    pub log_state_changes_only: Option<bool>,

    /// Workload ids that are never shut down
    #[serde(default)]
    pub excluded_vms: Vec<u32>,

    /// Seconds each guest gets to shut down cleanly (default: 60)
    pub workload_timeout: Option<u64>,

    /// Seconds to wait after workload shutdowns before powering off a node (default: 30)
    pub settle_delay: Option<u64>,

    /// Upper bound in seconds on one node shutdown sequence (default: 300)
    pub sequence_timeout: Option<u64>,

    /// Cluster API access
    pub api: RawApiConfig,

    /// Ordered stages for the daily cascade
    #[serde(default)]
    pub shutdown_order: Vec<RawShutdownStage>,

    /// Daily cascade time
    pub shutdown_time: Option<RawShutdownTime>,
}

/// Proxmox API connection settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawApiConfig {
    pub host: String,

    /// API port (default: 8006)
    pub port: Option<u16>,

    /// User the token belongs to, e.g. "root@pam"
    pub user: String,

    pub token_name: String,

    pub token_value: String,

    /// Verify the server certificate (default: true)
    pub verify_ssl: Option<bool>,

    /// Per-request timeout in seconds (default: 30)
    pub request_timeout: Option<u64>,
}

/// One stage of the ordered cascade
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawShutdownStage {
    pub name: String,

    #[serde(default)]
    pub vmids: Vec<u32>,

    /// Seconds to wait after dispatching this stage (default: 30)
    pub wait_after: Option<u64>,
}

/// Local wall time of the daily cascade
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RawShutdownTime {
    pub hour: u8,
    #[serde(default)]
    pub minute: u8,
}
