//! A separate process (the CLI `submit` path) enqueues into the shared
//! sqlite queue and the daemon's workers pick the tasks up.

use std::time::Duration;

use centinela_core::queue::Lane;
use centinela_core::types::ScanStatus;
use centinela_engine::{Backends, ScanCoordinator, ScanOutcome, ScanRequest, wait_until_settled};

use crate::helpers::config::TestConfigBuilder;
use crate::helpers::daemon::RunningDaemon;
use crate::helpers::modules::standard_registry;

#[tokio::test]
async fn test_e2e_external_submitter_shares_the_queue() {
    // Given: A daemon on sqlite store + sqlite queue
    let dir = tempfile::tempdir().expect("temp dir");
    let db = dir.path().join("centinela.db");
    let config = TestConfigBuilder::new().sqlite(&db, true).build();
    let (registry, _) = standard_registry();
    let daemon = RunningDaemon::start(config.clone(), registry.clone()).await;

    // When: An independent connection submits two scans
    let Backends::Sqlite { store, queue } = Backends::open(&config)
        .await
        .expect("submitter should open the same database")
    else {
        panic!("expected sqlite backends");
    };
    let coordinator = ScanCoordinator::new(store.clone(), queue.clone(), registry);
    let first = coordinator
        .submit_scan(ScanRequest::new("carol", "example.net", ["dns", "ssl"]))
        .await
        .expect("first submission");
    let second = coordinator
        .submit_scan(ScanRequest::new("carol", "203.0.113.9", ["nmap", "whois"]))
        .await
        .expect("second submission");

    // Then: The daemon completes both
    for scan_id in [first, second] {
        let report = wait_until_settled(
            store.as_ref(),
            scan_id,
            Duration::from_millis(50),
            Duration::from_secs(10),
        )
        .await
        .expect("scan should settle");
        assert_eq!(report.scan.status, ScanStatus::Completed);
        if scan_id == first {
            assert_eq!(report.summary.outcome, ScanOutcome::Succeeded);
        } else {
            assert_eq!(report.summary.outcome, ScanOutcome::Partial);
        }
    }

    // And: Every task was acknowledged
    daemon.stop().await;
    assert_eq!(queue.depth(Lane::Default).await.expect("depth"), 0);
    assert_eq!(queue.depth(Lane::Heavy).await.expect("depth"), 0);
}
