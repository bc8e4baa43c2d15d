//! The polling loop that drives everything

use chrono::{DateTime, Local, NaiveDate, Timelike};
use drowse_config::Policy;
use drowse_host_api::{ClusterApi, LocalPower};
use drowse_util::{
    DrowseError, MonotonicInstant, NodeName, Result, WallClock, format_duration,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::breaker::ErrorCircuitBreaker;
use crate::events::CoreEvent;
use crate::idle;
use crate::lifecycle::{self, Action, Observation, Transition};
use crate::orchestrator::Orchestrator;
use crate::state::{NodeRuntimeState, NodeState};

/// Half-width of the daily shutdown window
pub const DAILY_WINDOW_MINUTES: u32 = 5;

/// Iterations between heartbeat logs in verbose mode
const HEARTBEAT_EVERY: u64 = 10;

/// What one tick did
#[derive(Debug, Default)]
pub struct TickReport {
    pub events: Vec<CoreEvent>,
    /// Failures counted against the circuit breaker
    pub failures: u32,
}

/// Owns all per-node state and the error counter; ticks never overlap
pub struct Scheduler {
    api: Arc<dyn ClusterApi>,
    policy: Arc<Policy>,
    orchestrator: Orchestrator,
    nodes: HashMap<NodeName, NodeRuntimeState>,
    breaker: ErrorCircuitBreaker,
    last_cascade_date: Option<NaiveDate>,
    iteration: u64,
}

impl Scheduler {
    pub fn new(api: Arc<dyn ClusterApi>, local: Arc<dyn LocalPower>, policy: Policy) -> Self {
        let policy = Arc::new(policy);
        let orchestrator = Orchestrator::new(api.clone(), local, policy.clone());

        Self {
            api,
            breaker: ErrorCircuitBreaker::new(policy.max_consecutive_errors),
            policy,
            orchestrator,
            nodes: HashMap::new(),
            last_cascade_date: None,
            iteration: 0,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn node_state(&self, node: &NodeName) -> Option<&NodeRuntimeState> {
        self.nodes.get(node)
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.breaker.consecutive()
    }

    pub fn is_halted(&self) -> bool {
        self.breaker.is_tripped()
    }

    /// Run until a stop is requested or the breaker trips.
    ///
    /// The stop signal is only seen between ticks; a running sequence
    /// always completes.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> Result<()> {
        info!(
            check_interval = %format_duration(self.policy.check_interval),
            monitored_nodes = ?self.policy.monitored_nodes,
            safe_shutdown_tag = %self.policy.safe_shutdown_tag,
            grace_period = %format_duration(self.policy.grace_period),
            dry_run = self.policy.dry_run,
            log_state_changes_only = self.policy.log_state_changes_only,
            "Idle shutdown scheduler started"
        );

        if self.policy.dry_run {
            warn!("DRY-RUN mode: nodes will NOT be powered off, but tagged workloads WILL be shut down");
        }

        loop {
            if *stop.borrow() {
                break;
            }

            self.tick(MonotonicInstant::now(), drowse_util::now()).await;

            if self.breaker.is_tripped() {
                error!(
                    consecutive_errors = self.breaker.consecutive(),
                    max_allowed = self.breaker.max(),
                    iterations = self.iteration,
                    "Too many consecutive errors, stopping"
                );
                return Err(DrowseError::FatalErrorThreshold {
                    consecutive: self.breaker.consecutive(),
                    max: self.breaker.max(),
                });
            }

            if !self.policy.log_state_changes_only && self.iteration % HEARTBEAT_EVERY == 0 {
                info!(
                    iteration = self.iteration,
                    monitored_nodes = self.policy.monitored_nodes.len(),
                    errors = self.breaker.consecutive(),
                    "Scheduler running"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.policy.check_interval) => {}
                _ = stop.changed() => {
                    info!("Stop requested");
                    break;
                }
            }
        }

        info!(iterations = self.iteration, "Scheduler stopped");
        Ok(())
    }

    /// Evaluate every monitored node once, then check the daily window.
    ///
    /// Stops early if the breaker trips part-way through.
    pub async fn tick(&mut self, now: MonotonicInstant, wall: DateTime<Local>) -> TickReport {
        self.iteration += 1;
        let mut report = TickReport::default();

        if !self.policy.log_state_changes_only {
            debug!(nodes = ?self.policy.monitored_nodes, "Checking nodes");
        }

        let nodes = self.policy.monitored_nodes.clone();
        for node in &nodes {
            let failed = self.evaluate_node(node, now, &mut report.events).await;
            if failed {
                report.failures += 1;
                let consecutive = self.breaker.record_failure();
                debug!(node = %node, consecutive_errors = consecutive, "Failure counted");
                if self.breaker.is_tripped() {
                    return report;
                }
            }
        }

        if let Some(event) = self.check_daily_window(wall).await {
            report.events.push(event);
        }

        if report.failures == 0 {
            self.breaker.record_success();
        }

        report
    }

    /// Returns true when the node counts as a failure this tick
    async fn evaluate_node(
        &mut self,
        node: &NodeName,
        now: MonotonicInstant,
        events: &mut Vec<CoreEvent>,
    ) -> bool {
        let (observation, mut failed) = match self.observe(node).await {
            Ok(observation) => (observation, false),
            Err(e) => {
                error!(
                    node = %node,
                    error = %e,
                    consecutive_errors = self.breaker.consecutive() + 1,
                    "Node check failed"
                );
                events.push(CoreEvent::NodeCheckFailed {
                    node: node.clone(),
                    error: e.to_string(),
                });
                (Observation::Unavailable, true)
            }
        };

        let runtime = self.nodes.entry(node.clone()).or_default();
        let transition = lifecycle::step(runtime, &observation, now, self.policy.grace_period);

        self.log_transition(node, &observation, &transition);
        if transition.changed() {
            events.push(CoreEvent::StateChanged {
                node: node.clone(),
                previous: transition.previous,
                state: transition.state,
            });
        }

        if transition.action == Action::TriggerShutdown {
            let idle_for = transition.idle_for.unwrap_or_default();
            events.push(CoreEvent::ShutdownTriggered {
                node: node.clone(),
                idle_for,
            });

            match self.orchestrator.shutdown_node(node).await {
                Ok(sequence) => {
                    let workload_failures = sequence.batch.failed();
                    if workload_failures > 0 {
                        failed = true;
                    }
                    events.push(CoreEvent::ShutdownCompleted {
                        node: node.clone(),
                        dispatched: sequence.batch.dispatched(),
                        failed: workload_failures,
                        power_off: sequence.power_off,
                    });
                }
                Err(e) => {
                    error!(node = %node, error = %e, "Node shutdown failed");
                    events.push(CoreEvent::ShutdownFailed {
                        node: node.clone(),
                        error: e.to_string(),
                    });
                    failed = true;
                }
            }
        }

        failed
    }

    async fn observe(&self, node: &NodeName) -> Result<Observation> {
        let status = self
            .api
            .node_status(node)
            .await
            .map_err(|e| DrowseError::query(node, e.to_string()))?;

        if status.uptime < self.policy.min_uptime {
            return Ok(Observation::UptimeTooLow {
                uptime: status.uptime,
            });
        }

        let assessment = idle::evaluate(self.api.as_ref(), node, &self.policy.safe_shutdown_tag).await?;
        if assessment.is_idle() {
            Ok(Observation::Idle)
        } else {
            Ok(Observation::Busy {
                critical: assessment.critical.iter().map(|w| w.id).collect(),
            })
        }
    }

    fn log_transition(&self, node: &NodeName, observation: &Observation, transition: &Transition) {
        let verbose = !self.policy.log_state_changes_only;
        if !reports_at_info(transition, verbose) {
            if verbose {
                debug!(node = %node, state = %transition.state, idle_for = ?transition.idle_for, "Node state unchanged");
            }
            return;
        }

        match (transition.state, observation) {
            (NodeState::UptimeTooLow, Observation::UptimeTooLow { uptime }) => info!(
                node = %node,
                uptime = uptime.as_secs(),
                min_uptime = self.policy.min_uptime.as_secs(),
                "Node uptime too low"
            ),
            (NodeState::Active, Observation::Busy { critical }) => {
                if transition.previous.is_some_and(|s| s.is_idle()) {
                    info!(node = %node, critical = ?critical, "Node no longer idle, critical workloads running");
                } else {
                    info!(node = %node, critical = ?critical, "Node active");
                }
            }
            (NodeState::Active, _) => info!(node = %node, "Node state unknown, treating as active"),
            (NodeState::IdleStarted, _) => info!(
                node = %node,
                grace_period = %format_duration(self.policy.grace_period),
                "Node is idle (no critical workloads running)"
            ),
            (NodeState::GracePeriod, _) => {
                let remaining = self
                    .policy
                    .grace_period
                    .saturating_sub(transition.idle_for.unwrap_or_default());
                info!(node = %node, remaining = %format_duration(remaining), "Node in grace period");
            }
            (NodeState::ShutdownInitiated, _) => warn!(
                node = %node,
                idle_for = %format_duration(transition.idle_for.unwrap_or_default()),
                "Grace period expired, shutting node down"
            ),
            (state, _) => info!(node = %node, state = %state, "Node state changed"),
        }
    }

    /// Run the fleet cascade when wall time is inside today's window and it
    /// has not run for that day yet
    async fn check_daily_window(&mut self, wall: DateTime<Local>) -> Option<CoreEvent> {
        let target = self.policy.shutdown_time?;
        if !target.is_near(&wall, DAILY_WINDOW_MINUTES) {
            return None;
        }

        let date = window_date(target, &wall);
        if self.last_cascade_date == Some(date) {
            return None;
        }
        self.last_cascade_date = Some(date);

        info!(shutdown_time = %target, date = %date, "Daily shutdown time reached, starting cascade");
        let cascade = self.orchestrator.run_cascade().await;

        let (dispatched, failed) = (cascade.dispatched(), cascade.failed());
        if failed > 0 {
            warn!(dispatched, failed, "Cascade finished with failures");
        } else {
            info!(dispatched, "Cascade finished");
        }

        Some(CoreEvent::CascadeCompleted {
            date,
            dispatched,
            failed,
        })
    }
}

/// Whether a transition gets an info-level line. State changes always do;
/// in verbose mode a running grace period is reported on every tick.
fn reports_at_info(transition: &Transition, verbose: bool) -> bool {
    transition.changed() || (verbose && transition.state == NodeState::GracePeriod)
}

/// Calendar day a window occurrence belongs to. Near midnight the window
/// spans two dates; both sides map to the date of the target time.
pub fn window_date(target: WallClock, wall: &DateTime<Local>) -> NaiveDate {
    let today = wall.date_naive();
    let current = wall.hour() * 60 + wall.minute();
    let target = target.minutes_from_midnight();

    if current > target && current - target > 12 * 60 {
        // 23:58 with a 00:02 target: the occurrence is tomorrow's
        today.succ_opt().unwrap_or(today)
    } else if target > current && target - current > 12 * 60 {
        // 00:02 with a 23:58 target: the occurrence was yesterday's
        today.pred_opt().unwrap_or(today)
    } else {
        today
    }
}
