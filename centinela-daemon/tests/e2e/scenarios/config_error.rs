//! Invalid configuration is rejected before any backend is opened.

use std::path::Path;

use centinela_daemon::orchestrator::Orchestrator;

use crate::helpers::config::TestConfigBuilder;
use crate::helpers::modules::standard_registry;

#[tokio::test]
async fn test_e2e_missing_config_file() {
    let result = Orchestrator::build(Path::new("/nonexistent/centinela.toml")).await;
    let err = result.err().expect("build should fail");
    assert!(err.to_string().contains("failed to load config"), "got: {err}");
}

#[tokio::test]
async fn test_e2e_sqlite_queue_without_sqlite_store() {
    // Given: A queue backend that needs a store it does not have
    let mut config = TestConfigBuilder::new().build();
    config.queue.backend = "sqlite".to_owned();

    // When
    let (registry, _) = standard_registry();
    let result = Orchestrator::build_with_registry(config, registry).await;

    // Then
    let err = result.err().expect("build should fail");
    assert!(err.to_string().contains("queue.backend"), "got: {err}");
}

#[tokio::test]
async fn test_e2e_unreachable_database() {
    // Given: A sqlite URL in a directory that does not exist
    let config = TestConfigBuilder::new()
        .sqlite(Path::new("/nonexistent/dir/centinela.db"), false)
        .build();

    // When
    let (registry, _) = standard_registry();
    let result = Orchestrator::build_with_registry(config, registry).await;

    // Then
    let err = result.err().expect("build should fail");
    assert!(err.to_string().contains("failed to open backends"), "got: {err}");
}
