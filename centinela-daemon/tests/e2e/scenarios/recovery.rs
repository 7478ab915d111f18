//! Executions left pending by a crash are resubmitted on start.

use std::sync::Arc;
use std::time::Duration;

use centinela_core::types::{ExecutionStatus, ScanStatus};
use centinela_engine::{
    Backends, MemoryTaskQueue, ScanCoordinator, ScanReport, ScanRequest, wait_until_settled,
};

use crate::helpers::config::TestConfigBuilder;
use crate::helpers::daemon::RunningDaemon;
use crate::helpers::modules::standard_registry;

/// Persist a scan whose tasks go to a queue nobody consumes.
async fn persist_orphaned_scan(
    config: &centinela_core::config::CentinelaConfig,
) -> centinela_core::types::ScanId {
    let (registry, _) = standard_registry();
    let Backends::SqliteStore { store, .. } = Backends::open(config).await.expect("open") else {
        panic!("expected sqlite store with memory queue");
    };
    let lost_queue = Arc::new(MemoryTaskQueue::new());
    ScanCoordinator::new(store, lost_queue, registry)
        .submit_scan(ScanRequest::new("dave", "example.com", ["dns", "nmap"]))
        .await
        .expect("submission should succeed")
}

#[tokio::test]
async fn test_e2e_orphans_recovered_on_start() {
    // Given: A scan persisted before a crash, with its tasks lost
    let dir = tempfile::tempdir().expect("temp dir");
    let db = dir.path().join("centinela.db");
    let config = TestConfigBuilder::new()
        .sqlite(&db, false)
        .recover_on_start(true)
        .build();
    let scan_id = persist_orphaned_scan(&config).await;

    // When: The daemon starts
    let (registry, _) = standard_registry();
    let daemon = RunningDaemon::start(config, registry).await;
    let Backends::SqliteStore { store, .. } = daemon.orchestrator.backends().clone() else {
        panic!("expected sqlite store with memory queue");
    };

    // Then: The orphaned executions run and the scan completes
    let report = wait_until_settled(
        store.as_ref(),
        scan_id,
        Duration::from_millis(20),
        Duration::from_secs(5),
    )
    .await
    .expect("recovered scan should settle");
    assert_eq!(report.scan.status, ScanStatus::Completed);
    assert!(
        report
            .executions
            .iter()
            .all(|e| e.status == ExecutionStatus::Completed)
    );

    daemon.stop().await;
}

#[tokio::test]
async fn test_e2e_recovery_disabled_leaves_orphans_pending() {
    // Given: The same crash, with recovery switched off
    let dir = tempfile::tempdir().expect("temp dir");
    let db = dir.path().join("centinela.db");
    let config = TestConfigBuilder::new()
        .sqlite(&db, false)
        .recover_on_start(false)
        .build();
    let scan_id = persist_orphaned_scan(&config).await;

    // When
    let (registry, _) = standard_registry();
    let daemon = RunningDaemon::start(config, registry).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Then: Nothing has run
    let Backends::SqliteStore { store, .. } = daemon.orchestrator.backends().clone() else {
        panic!("expected sqlite store with memory queue");
    };
    let report = ScanReport::load(store.as_ref(), scan_id)
        .await
        .expect("report should load");
    assert_eq!(report.scan.status, ScanStatus::Running);
    assert_eq!(report.summary.pending, 2);

    daemon.stop().await;
}
