//! Daemon start -> scan submission -> completion -> shutdown.

use std::sync::atomic::Ordering;
use std::time::Duration;

use centinela_core::types::{ExecutionStatus, ScanStatus};
use centinela_engine::{
    Backends, ScanCoordinator, ScanOutcome, ScanReport, ScanRequest, wait_until_settled,
};

use crate::helpers::config::TestConfigBuilder;
use crate::helpers::daemon::RunningDaemon;
use crate::helpers::modules::standard_registry;

#[tokio::test]
async fn test_e2e_mixed_results_complete_the_scan() {
    // Given: A daemon whose whois module fails
    let (registry, calls) = standard_registry();
    let daemon = RunningDaemon::start(TestConfigBuilder::new().build(), registry.clone()).await;
    let Backends::Memory { store, queue } = daemon.orchestrator.backends().clone() else {
        panic!("expected memory backends");
    };

    // When: Submitting a scan across both lanes
    let coordinator = ScanCoordinator::new(store.clone(), queue, registry);
    let scan_id = coordinator
        .submit_scan(ScanRequest::new("alice", "example.com", ["dns", "whois", "nmap"]))
        .await
        .expect("submission should succeed");

    // Then: The scan completes with a partial outcome
    let report = wait_until_settled(
        store.as_ref(),
        scan_id,
        Duration::from_millis(20),
        Duration::from_secs(5),
    )
    .await
    .expect("scan should settle");

    assert_eq!(report.scan.status, ScanStatus::Completed);
    assert_eq!(report.summary.outcome, ScanOutcome::Partial);
    assert_eq!(report.summary.completed, 2);
    assert_eq!(report.summary.errored, 1);

    let whois = report
        .executions
        .iter()
        .find(|e| e.module == "whois")
        .expect("whois execution");
    assert_eq!(whois.status, ExecutionStatus::Error);
    assert_eq!(whois.result["kind"], "network");
    assert_eq!(whois.result["module"], "whois");

    // And: Each module ran exactly once
    assert_eq!(calls.dns.load(Ordering::SeqCst), 1);
    assert_eq!(calls.nmap.load(Ordering::SeqCst), 1);

    daemon.stop().await;
}

#[tokio::test]
async fn test_e2e_completed_scans_survive_restart() {
    // Given: A daemon on a sqlite store that finished one scan
    let dir = tempfile::tempdir().expect("temp dir");
    let db = dir.path().join("centinela.db");
    let config = TestConfigBuilder::new().sqlite(&db, false).build();
    let (registry, _) = standard_registry();

    let daemon = RunningDaemon::start(config.clone(), registry.clone()).await;
    let Backends::SqliteStore { store, queue } = daemon.orchestrator.backends().clone() else {
        panic!("expected sqlite store with memory queue");
    };
    let scan_id = ScanCoordinator::new(store.clone(), queue, registry.clone())
        .submit_scan(ScanRequest::new("alice", "198.51.100.4", ["ssl"]))
        .await
        .expect("submission should succeed");
    wait_until_settled(
        store.as_ref(),
        scan_id,
        Duration::from_millis(20),
        Duration::from_secs(5),
    )
    .await
    .expect("scan should settle");
    daemon.stop().await;

    // When: A new daemon starts on the same database
    let daemon = RunningDaemon::start(config, registry).await;
    let Backends::SqliteStore { store, .. } = daemon.orchestrator.backends().clone() else {
        panic!("expected sqlite store with memory queue");
    };

    // Then: The finished scan is still there and still completed
    let report = ScanReport::load(store.as_ref(), scan_id)
        .await
        .expect("report should load");
    assert_eq!(report.scan.status, ScanStatus::Completed);
    assert_eq!(report.summary.outcome, ScanOutcome::Succeeded);
    assert_eq!(report.executions[0].result["target"], "198.51.100.4");

    daemon.stop().await;
}

#[tokio::test]
async fn test_e2e_pid_file_lifecycle() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pid = dir.path().join("run").join("centinela.pid");
    let (registry, _) = standard_registry();

    let config = TestConfigBuilder::new().pid_file(&pid).build();
    let daemon = RunningDaemon::start(config, registry).await;
    tokio::time::timeout(Duration::from_secs(2), async {
        while !pid.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("PID file should be written");

    daemon.stop().await;
    assert!(!pid.exists(), "PID file should be removed on shutdown");
}
