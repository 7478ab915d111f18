//! Running an orchestrator in the background of a test.

use std::sync::Arc;
use std::time::Duration;

use centinela_core::config::CentinelaConfig;
use centinela_core::module::ModuleRegistry;
use centinela_daemon::orchestrator::Orchestrator;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct RunningDaemon {
    pub orchestrator: Arc<Orchestrator>,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningDaemon {
    pub async fn start(config: CentinelaConfig, registry: ModuleRegistry) -> Self {
        let orchestrator = Arc::new(
            Orchestrator::build_with_registry(config, registry)
                .await
                .expect("orchestrator should build"),
        );
        let shutdown = orchestrator.shutdown_token();
        let handle = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.run().await }
        });
        Self {
            orchestrator,
            shutdown,
            handle,
        }
    }

    /// Cancel the daemon and wait for a clean exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("daemon should stop within 10s")
            .expect("daemon task should not panic");
        assert!(result.is_ok(), "daemon run failed: {result:?}");
    }
}
