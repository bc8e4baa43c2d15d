//! Core events emitted by the scheduler

use chrono::NaiveDate;
use drowse_util::NodeName;
use std::time::Duration;

use crate::orchestrator::PowerOff;
use crate::state::NodeState;

/// Events emitted by the scheduler during a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// A node moved to a different lifecycle state
    StateChanged {
        node: NodeName,
        previous: Option<NodeState>,
        state: NodeState,
    },

    /// Grace period ran out; the shutdown sequence is starting
    ShutdownTriggered { node: NodeName, idle_for: Duration },

    /// Shutdown sequence finished
    ShutdownCompleted {
        node: NodeName,
        dispatched: usize,
        failed: usize,
        power_off: PowerOff,
    },

    /// Shutdown sequence aborted (timeout, listing or power-off failure)
    ShutdownFailed { node: NodeName, error: String },

    /// Status or workload query for a node failed
    NodeCheckFailed { node: NodeName, error: String },

    /// Daily cascade ran
    CascadeCompleted {
        date: NaiveDate,
        dispatched: usize,
        failed: usize,
    },
}
