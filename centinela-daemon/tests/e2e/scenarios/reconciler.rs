//! A scan whose settle step was lost is completed by the reconciler.

use std::sync::Arc;
use std::time::Duration;

use centinela_core::store::{ClaimOutcome, ExecutionOutcome, StatusStore};
use centinela_core::types::ScanStatus;
use centinela_engine::{Backends, MemoryTaskQueue, ScanCoordinator, ScanRequest, wait_until_settled};
use serde_json::json;

use crate::helpers::config::TestConfigBuilder;
use crate::helpers::daemon::RunningDaemon;
use crate::helpers::modules::standard_registry;

#[tokio::test]
async fn test_e2e_reconciler_completes_stuck_scan() {
    // Given: All executions finished but the scan was never settled
    let dir = tempfile::tempdir().expect("temp dir");
    let db = dir.path().join("centinela.db");
    let config = TestConfigBuilder::new()
        .sqlite(&db, false)
        .recover_on_start(false)
        .reconcile_interval_secs(1)
        .build();

    let (registry, _) = standard_registry();
    let Backends::SqliteStore { store, .. } = Backends::open(&config).await.expect("open") else {
        panic!("expected sqlite store with memory queue");
    };
    let coordinator =
        ScanCoordinator::new(store.clone(), Arc::new(MemoryTaskQueue::new()), registry.clone());
    let scan_id = coordinator
        .submit_scan(ScanRequest::new("erin", "example.com", ["dns", "ssl"]))
        .await
        .expect("submission should succeed");

    for execution in store.list_executions(scan_id).await.expect("list") {
        let ClaimOutcome::Claimed(claimed) =
            store.claim_execution(execution.id).await.expect("claim")
        else {
            panic!("execution should be claimable");
        };
        let finished = store
            .finish_execution(
                execution.id,
                claimed.attempt,
                ExecutionOutcome::Completed(json!({ "ok": true })),
            )
            .await
            .expect("finish");
        assert!(finished);
    }
    let scan = store.get_scan(scan_id).await.expect("get").expect("scan exists");
    assert_eq!(scan.status, ScanStatus::Running);

    // When: The daemon runs its reconciler
    let daemon = RunningDaemon::start(config, registry).await;

    // Then: The scan is completed within a few reconcile intervals
    let report = wait_until_settled(
        store.as_ref(),
        scan_id,
        Duration::from_millis(50),
        Duration::from_secs(5),
    )
    .await
    .expect("reconciler should complete the scan");
    assert_eq!(report.scan.status, ScanStatus::Completed);

    daemon.stop().await;
}
