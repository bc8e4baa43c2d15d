//! Node lifecycle state machine
//!
//! ```text
//! UPTIME_TOO_LOW ──► ACTIVE ◄──────────────┐
//!                      │ idle              │ critical workload
//!                      ▼                   │
//!                IDLE_STARTED ──► GRACE_PERIOD
//!                                     │ idle >= grace
//!                                     ▼
//!                              SHUTDOWN_INITIATED
//! ```
//!
//! Transitions are pure: the scheduler gathers an [`Observation`], calls
//! [`step`], and carries out the returned [`Action`].

use drowse_util::{MonotonicInstant, WorkloadId};
use std::time::Duration;

use crate::state::{NodeRuntimeState, NodeState};

/// What one tick learned about a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    UptimeTooLow { uptime: Duration },
    /// Critical workloads are running
    Busy { critical: Vec<WorkloadId> },
    Idle,
    /// Status or workload query failed; treated as not idle
    Unavailable,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// Run the node-triggered shutdown sequence
    TriggerShutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub previous: Option<NodeState>,
    pub state: NodeState,
    pub action: Action,
    /// Length of the idle streak, when one is running
    pub idle_for: Option<Duration>,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.previous != Some(self.state)
    }
}

/// Advance one node by one tick
pub fn step(
    runtime: &mut NodeRuntimeState,
    observation: &Observation,
    now: MonotonicInstant,
    grace_period: Duration,
) -> Transition {
    let previous = runtime.last_state;
    let mut action = Action::None;
    let mut idle_for = None;

    let state = match observation {
        Observation::UptimeTooLow { .. } => {
            runtime.idle_since = None;
            NodeState::UptimeTooLow
        }
        Observation::Busy { .. } | Observation::Unavailable => {
            runtime.idle_since = None;
            NodeState::Active
        }
        Observation::Idle => match runtime.idle_since {
            None => {
                runtime.idle_since = Some(now);
                idle_for = Some(Duration::ZERO);
                NodeState::IdleStarted
            }
            Some(since) => {
                let elapsed = now.duration_since(since);
                idle_for = Some(elapsed);
                if elapsed >= grace_period {
                    runtime.idle_since = None;
                    action = Action::TriggerShutdown;
                    NodeState::ShutdownInitiated
                } else {
                    NodeState::GracePeriod
                }
            }
        },
    };

    runtime.last_state = Some(state);

    Transition {
        previous,
        state,
        action,
        idle_for,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(60);

    #[test]
    fn low_uptime_never_starts_timer() {
        let mut rt = NodeRuntimeState::default();
        let t0 = MonotonicInstant::now();

        let tr = step(
            &mut rt,
            &Observation::UptimeTooLow {
                uptime: Duration::from_secs(500),
            },
            t0,
            GRACE,
        );
        assert_eq!(tr.state, NodeState::UptimeTooLow);
        assert!(tr.changed());
        assert!(rt.idle_since.is_none());
    }

    #[test]
    fn grace_period_then_single_trigger() {
        let mut rt = NodeRuntimeState::default();
        let t0 = MonotonicInstant::now();

        let tr = step(&mut rt, &Observation::Idle, t0, GRACE);
        assert_eq!(tr.state, NodeState::IdleStarted);
        assert_eq!(rt.idle_since, Some(t0));

        let tr = step(&mut rt, &Observation::Idle, t0 + Duration::from_secs(30), GRACE);
        assert_eq!(tr.state, NodeState::GracePeriod);
        assert_eq!(tr.action, Action::None);
        assert_eq!(tr.idle_for, Some(Duration::from_secs(30)));

        let tr = step(&mut rt, &Observation::Idle, t0 + Duration::from_secs(65), GRACE);
        assert_eq!(tr.state, NodeState::ShutdownInitiated);
        assert_eq!(tr.action, Action::TriggerShutdown);
        assert!(rt.idle_since.is_none());

        // Still idle next tick: a new streak starts, no second trigger
        let tr = step(&mut rt, &Observation::Idle, t0 + Duration::from_secs(95), GRACE);
        assert_eq!(tr.state, NodeState::IdleStarted);
        assert_eq!(tr.action, Action::None);
    }

    #[test]
    fn trigger_at_exact_grace_boundary() {
        let mut rt = NodeRuntimeState::default();
        let t0 = MonotonicInstant::now();

        step(&mut rt, &Observation::Idle, t0, GRACE);
        let tr = step(&mut rt, &Observation::Idle, t0 + GRACE, GRACE);
        assert_eq!(tr.action, Action::TriggerShutdown);
    }

    #[test]
    fn critical_workload_resets_timer() {
        let mut rt = NodeRuntimeState::default();
        let t0 = MonotonicInstant::now();

        step(&mut rt, &Observation::Idle, t0, GRACE);
        let tr = step(
            &mut rt,
            &Observation::Busy {
                critical: vec![WorkloadId::new(100)],
            },
            t0 + Duration::from_secs(30),
            GRACE,
        );
        assert_eq!(tr.state, NodeState::Active);
        assert_eq!(tr.previous, Some(NodeState::IdleStarted));
        assert!(rt.idle_since.is_none());

        // Idle again: the streak restarts from zero
        let tr = step(&mut rt, &Observation::Idle, t0 + Duration::from_secs(61), GRACE);
        assert_eq!(tr.state, NodeState::IdleStarted);
    }

    #[test]
    fn query_failure_is_not_idle() {
        let mut rt = NodeRuntimeState::default();
        let t0 = MonotonicInstant::now();

        step(&mut rt, &Observation::Idle, t0, GRACE);
        let tr = step(&mut rt, &Observation::Unavailable, t0 + Duration::from_secs(10), GRACE);
        assert_eq!(tr.state, NodeState::Active);
        assert!(rt.idle_since.is_none());
    }

    #[test]
    fn repeated_state_is_not_a_change() {
        let mut rt = NodeRuntimeState::default();
        let t0 = MonotonicInstant::now();
        let busy = Observation::Busy { critical: vec![] };

        assert!(step(&mut rt, &busy, t0, GRACE).changed());
        assert!(!step(&mut rt, &busy, t0 + Duration::from_secs(300), GRACE).changed());
    }
}
