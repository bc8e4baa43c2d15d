//! Per-node runtime state

use drowse_util::MonotonicInstant;
use std::fmt;

/// Last observed lifecycle state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// At least one critical workload is running
    Active,
    /// Node booted too recently to be judged
    UptimeTooLow,
    /// First tick of an idle streak
    IdleStarted,
    /// Idle, waiting for the grace period to run out
    GracePeriod,
    /// Shutdown sequence was invoked
    ShutdownInitiated,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::UptimeTooLow => "UPTIME_TOO_LOW",
            Self::IdleStarted => "IDLE_STARTED",
            Self::GracePeriod => "GRACE_PERIOD",
            Self::ShutdownInitiated => "SHUTDOWN_INITIATED",
        }
    }

    /// Whether the node was counting towards a shutdown in this state
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::IdleStarted | Self::GracePeriod)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable tracking for one monitored node. Lives only in memory.
#[derive(Debug, Clone, Default)]
pub struct NodeRuntimeState {
    /// Start of the current idle streak
    pub idle_since: Option<MonotonicInstant>,

    /// None until the node has been evaluated once
    pub last_state: Option<NodeState>,
}

impl NodeRuntimeState {
    /// State as seen by callers; a node never evaluated counts as active
    pub fn state(&self) -> NodeState {
        self.last_state.unwrap_or(NodeState::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_node_is_active_without_timer() {
        let rt = NodeRuntimeState::default();
        assert_eq!(rt.state(), NodeState::Active);
        assert!(rt.idle_since.is_none());
        assert!(rt.last_state.is_none());
    }

    #[test]
    fn state_names() {
        assert_eq!(NodeState::UptimeTooLow.to_string(), "UPTIME_TOO_LOW");
        assert!(NodeState::GracePeriod.is_idle());
        assert!(!NodeState::ShutdownInitiated.is_idle());
    }
}
