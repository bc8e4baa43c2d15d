//! Integration tests for drowsed
//!
//! These tests drive the scheduler and orchestrator end to end against the
//! in-memory cluster.

use chrono::{DateTime, Local, TimeZone};
use drowse_config::{Policy, ShutdownStage, parse_config_for_host};
use drowse_core::{CoreEvent, NodeState, Orchestrator, PowerOff, Scheduler};
use drowse_host_api::{MockCluster, MockLocalPower, Workload, WorkloadKind, WorkloadStatus};
use drowse_util::{DrowseError, MonotonicInstant, NodeName, WorkloadId};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const TAG: &str = "safe-shutdown";

fn make_test_policy() -> Policy {
    Policy {
        enabled: true,
        monitored_nodes: vec![NodeName::new("pve01")],
        local_node: NodeName::new("mgmt"),
        grace_period: Duration::from_secs(60),
        min_uptime: Duration::from_secs(600),
        dry_run: false,
        ..Default::default()
    }
}

fn noon() -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
}

fn running(id: u32) -> Workload {
    Workload::new(id, WorkloadKind::Vm, WorkloadStatus::Running)
}

fn setup(policy: Policy, uptime: u64) -> (Arc<MockCluster>, Arc<MockLocalPower>, Scheduler) {
    let mock = Arc::new(MockCluster::new());
    mock.add_node("pve01", uptime);
    let local = Arc::new(MockLocalPower::new());
    let scheduler = Scheduler::new(mock.clone(), local.clone(), policy);
    (mock, local, scheduler)
}

fn pve01() -> NodeName {
    NodeName::new("pve01")
}

#[tokio::test]
async fn test_low_uptime_never_starts_timer() {
    let (mock, _local, mut scheduler) = setup(make_test_policy(), 500);
    mock.add_workload("pve01", running(100).with_tag(TAG));
    let t0 = MonotonicInstant::now();

    for i in 0..3 {
        scheduler
            .tick(t0 + Duration::from_secs(i * 300), noon())
            .await;
        let state = scheduler.node_state(&pve01()).unwrap();
        assert_eq!(state.state(), NodeState::UptimeTooLow);
        assert!(state.idle_since.is_none());
    }
    assert!(mock.shutdown_requests().is_empty());
}

#[tokio::test]
async fn test_untagged_running_workload_keeps_node_active() {
    let (mock, _local, mut scheduler) = setup(make_test_policy(), 3600);
    mock.add_workload("pve01", running(100));

    let report = scheduler.tick(MonotonicInstant::now(), noon()).await;

    assert_eq!(
        report.events,
        vec![CoreEvent::StateChanged {
            node: pve01(),
            previous: None,
            state: NodeState::Active,
        }]
    );
    assert!(scheduler.node_state(&pve01()).unwrap().idle_since.is_none());
    assert_eq!(report.failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_grace_period_then_exactly_one_shutdown() {
    let (mock, local, mut scheduler) = setup(make_test_policy(), 3600);
    mock.add_workload("pve01", running(100).with_tag(TAG));
    let t0 = MonotonicInstant::now();

    scheduler.tick(t0, noon()).await;
    assert_eq!(
        scheduler.node_state(&pve01()).unwrap().state(),
        NodeState::IdleStarted
    );

    scheduler.tick(t0 + Duration::from_secs(30), noon()).await;
    assert_eq!(
        scheduler.node_state(&pve01()).unwrap().state(),
        NodeState::GracePeriod
    );
    assert!(mock.node_shutdowns().is_empty());

    let report = scheduler.tick(t0 + Duration::from_secs(65), noon()).await;
    assert!(report.events.iter().any(|e| matches!(
        e,
        CoreEvent::ShutdownTriggered { idle_for, .. } if *idle_for == Duration::from_secs(65)
    )));
    assert!(report.events.iter().any(|e| matches!(
        e,
        CoreEvent::ShutdownCompleted {
            dispatched: 1,
            failed: 0,
            power_off: PowerOff::Remote,
            ..
        }
    )));
    assert_eq!(mock.shutdown_requests(), vec![100]);
    assert_eq!(mock.node_shutdowns(), vec![pve01()]);
    assert_eq!(local.power_off_count(), 0);

    let state = scheduler.node_state(&pve01()).unwrap();
    assert_eq!(state.state(), NodeState::ShutdownInitiated);
    assert!(state.idle_since.is_none());

    // Next tick starts a fresh streak instead of triggering again
    scheduler.tick(t0 + Duration::from_secs(95), noon()).await;
    assert_eq!(mock.node_shutdowns().len(), 1);
    assert_eq!(
        scheduler.node_state(&pve01()).unwrap().state(),
        NodeState::IdleStarted
    );
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_dispatches_workloads_but_not_power_off() {
    let mut policy = make_test_policy();
    policy.dry_run = true;
    let (mock, local, mut scheduler) = setup(policy, 3600);
    mock.add_workload("pve01", running(100).with_tag(TAG));
    let t0 = MonotonicInstant::now();

    scheduler.tick(t0, noon()).await;
    let report = scheduler.tick(t0 + Duration::from_secs(61), noon()).await;

    assert!(report.events.iter().any(|e| matches!(
        e,
        CoreEvent::ShutdownCompleted {
            power_off: PowerOff::DryRun,
            ..
        }
    )));
    assert_eq!(mock.shutdown_requests(), vec![100]);
    assert!(mock.node_shutdowns().is_empty());
    assert_eq!(local.power_off_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_excluded_workload_never_dispatched() {
    let mut policy = make_test_policy();
    policy.excluded.insert(WorkloadId::new(100));
    policy.stages = vec![ShutdownStage::new("all", &[100, 101], Duration::ZERO)];
    let (mock, _local, mut scheduler) = setup(policy.clone(), 3600);
    mock.add_workload("pve01", running(100).with_tag(TAG));
    mock.add_workload("pve01", running(101).with_tag(TAG));
    let t0 = MonotonicInstant::now();

    scheduler.tick(t0, noon()).await;
    scheduler.tick(t0 + Duration::from_secs(120), noon()).await;
    assert_eq!(mock.shutdown_requests(), vec![101]);

    let orchestrator = Orchestrator::new(
        mock.clone(),
        Arc::new(MockLocalPower::new()),
        Arc::new(policy),
    );
    orchestrator.run_cascade().await;
    assert!(!mock.shutdown_requests().contains(&100));
}

#[tokio::test(start_paused = true)]
async fn test_ordered_cascade_continues_past_failures() {
    let mut policy = make_test_policy();
    policy.stages = vec![
        ShutdownStage::new("clients", &[101, 102], Duration::from_secs(5)),
        ShutdownStage::new("server", &[200], Duration::ZERO),
    ];
    let mock = Arc::new(MockCluster::new());
    mock.add_node("pve01", 3600);
    mock.add_node("pve02", 3600);
    mock.add_workload("pve01", running(101));
    mock.add_workload(
        "pve02",
        Workload::new(102, WorkloadKind::Container, WorkloadStatus::Running),
    );
    mock.add_workload("pve02", running(200));
    mock.fail_workload_shutdown(101);

    let orchestrator = Orchestrator::new(
        mock.clone(),
        Arc::new(MockLocalPower::new()),
        Arc::new(policy),
    );

    let started = tokio::time::Instant::now();
    let report = orchestrator.run_cascade().await;

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(report.stages.len(), 2);
    assert_eq!(report.stages[0].failed(), 1);
    assert_eq!(report.stages[1].batch.dispatched(), 1);
    assert_eq!(report.failed(), 1);

    // Server stage strictly after both client requests
    let requests = mock.shutdown_requests();
    assert_eq!(requests.len(), 3);
    let mut clients = requests[..2].to_vec();
    clients.sort();
    assert_eq!(clients, vec![101, 102]);
    assert_eq!(requests[2], 200);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_halts_after_max_failing_ticks() {
    let mut policy = make_test_policy();
    policy.max_consecutive_errors = 3;
    let (mock, _local, mut scheduler) = setup(policy, 3600);
    mock.fail_node_status("pve01");

    let (_tx, rx) = watch::channel(false);
    let err = scheduler.run(rx).await.unwrap_err();

    assert!(matches!(
        err,
        DrowseError::FatalErrorThreshold {
            consecutive: 3,
            max: 3
        }
    ));
    assert_eq!(mock.status_calls(), 3);
    assert!(scheduler.is_halted());
}

#[tokio::test(start_paused = true)]
async fn test_workload_failure_counts_against_breaker() {
    let (mock, _local, mut scheduler) = setup(make_test_policy(), 3600);
    mock.add_workload("pve01", running(100).with_tag(TAG));
    mock.fail_workload_shutdown(100);
    let t0 = MonotonicInstant::now();

    scheduler.tick(t0, noon()).await;
    let report = scheduler.tick(t0 + Duration::from_secs(60), noon()).await;

    assert_eq!(report.failures, 1);
    assert_eq!(scheduler.consecutive_errors(), 1);
    // The node is still powered off
    assert_eq!(mock.node_shutdowns().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_config_file_to_shutdown() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        config_version = 1
        enabled = true
        monitored_nodes = ["pve01"]
        grace_period = 30
        min_uptime = 60
        dry_run = true

        [api]
        host = "pve.example.net"
        user = "root@pam"
        token_name = "drowse"
        token_value = "secret"
        "#
    )
    .unwrap();

    let content = std::fs::read_to_string(file.path()).unwrap();
    let policy = parse_config_for_host(&content, "pve01").unwrap();
    assert!(policy.enabled);
    assert!(policy.is_local(&pve01()));

    let (mock, local, mut scheduler) = setup(policy, 120);
    let t0 = MonotonicInstant::now();

    scheduler.tick(t0, noon()).await;
    let report = scheduler.tick(t0 + Duration::from_secs(30), noon()).await;

    assert!(report.events.iter().any(|e| matches!(
        e,
        CoreEvent::ShutdownCompleted {
            dispatched: 0,
            power_off: PowerOff::DryRun,
            ..
        }
    )));
    assert_eq!(local.power_off_count(), 0);
    assert!(mock.node_shutdowns().is_empty());
}
