//! A failing, panicking or hung module must not affect its siblings.

use std::time::Duration;

use centinela_core::types::{ExecutionStatus, ScanStatus};
use centinela_engine::{Backends, ScanCoordinator, ScanOutcome, ScanRequest, wait_until_settled};

use crate::helpers::config::TestConfigBuilder;
use crate::helpers::daemon::RunningDaemon;
use crate::helpers::modules::faulty_registry;

#[tokio::test]
async fn test_e2e_faulty_modules_are_isolated() {
    // Given: A registry with failing, panicking and stuck modules
    let registry = faulty_registry();
    let config = TestConfigBuilder::new().heavy_timeout_secs(1).build();
    let daemon = RunningDaemon::start(config, registry.clone()).await;
    let Backends::Memory { store, queue } = daemon.orchestrator.backends().clone() else {
        panic!("expected memory backends");
    };

    // When: One scan selects all of them
    let scan_id = ScanCoordinator::new(store.clone(), queue, registry)
        .submit_scan(ScanRequest::new(
            "bob",
            "example.org",
            ["healthy", "failing", "panicking", "stuck"],
        ))
        .await
        .expect("submission should succeed");

    let report = wait_until_settled(
        store.as_ref(),
        scan_id,
        Duration::from_millis(20),
        Duration::from_secs(10),
    )
    .await
    .expect("scan should settle despite faulty modules");

    // Then: Every failure is recorded on its own row
    assert_eq!(report.scan.status, ScanStatus::Completed);
    assert_eq!(report.summary.outcome, ScanOutcome::Partial);

    let kind_of = |module: &str| {
        let exec = report
            .executions
            .iter()
            .find(|e| e.module == module)
            .expect("execution should exist");
        (exec.status, exec.result["kind"].as_str().map(str::to_owned))
    };
    assert_eq!(kind_of("healthy"), (ExecutionStatus::Completed, None));
    assert_eq!(kind_of("failing"), (ExecutionStatus::Error, Some("network".to_owned())));
    assert_eq!(kind_of("panicking"), (ExecutionStatus::Error, Some("panic".to_owned())));
    assert_eq!(kind_of("stuck"), (ExecutionStatus::Error, Some("timeout".to_owned())));

    // And: The daemon is still serving
    daemon.stop().await;
}
