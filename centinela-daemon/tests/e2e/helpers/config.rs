//! Test configuration builder.

use std::path::Path;

use centinela_core::config::CentinelaConfig;

/// Builder for test-friendly `CentinelaConfig` instances.
///
/// Defaults to memory backends, no PID file, small worker pools and a
/// fast reconciler.
pub struct TestConfigBuilder {
    config: CentinelaConfig,
}

#[allow(dead_code)]
impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = CentinelaConfig::default();
        config.general.pid_file = String::new();
        config.store.backend = "memory".to_owned();
        config.queue.backend = "memory".to_owned();
        config.queue.poll_interval_ms = 20;
        config.worker.default_concurrency = 2;
        config.worker.heavy_concurrency = 1;
        config.worker.retry_delay_secs = 1;
        config.worker.reconcile_interval_secs = 1;
        Self { config }
    }

    /// sqlite store at `db`, with the sqlite queue when `shared_queue` is set.
    pub fn sqlite(mut self, db: &Path, shared_queue: bool) -> Self {
        self.config.store.backend = "sqlite".to_owned();
        self.config.store.url = sqlite_url(db);
        self.config.queue.backend = if shared_queue { "sqlite" } else { "memory" }.to_owned();
        self
    }

    pub fn default_timeout_secs(mut self, secs: u64) -> Self {
        self.config.worker.default_timeout_secs = secs;
        self
    }

    pub fn heavy_timeout_secs(mut self, secs: u64) -> Self {
        self.config.worker.heavy_timeout_secs = secs;
        self
    }

    pub fn recover_on_start(mut self, enabled: bool) -> Self {
        self.config.worker.recover_on_start = enabled;
        self
    }

    pub fn reconcile_interval_secs(mut self, secs: u64) -> Self {
        self.config.worker.reconcile_interval_secs = secs;
        self
    }

    pub fn pid_file(mut self, path: &Path) -> Self {
        self.config.general.pid_file = path.to_string_lossy().into_owned();
        self
    }

    pub fn build(self) -> CentinelaConfig {
        self.config
    }
}

pub fn sqlite_url(db: &Path) -> String {
    format!("sqlite://{}", db.display())
}
