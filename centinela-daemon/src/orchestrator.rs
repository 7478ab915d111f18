//! Daemon orchestration -- backend assembly, worker pools and lifecycle.
//!
//! The [`Orchestrator`] loads configuration, opens the configured status
//! store and task queue, builds the module registry and then runs:
//!
//! 1. orphan recovery (pending executions resubmitted to their lane)
//! 2. one worker pool per lane
//! 3. the reconciler, re-running the settle check for every running scan
//! 4. periodic health and uptime reporting
//!
//! # Shutdown
//!
//! On SIGTERM, SIGINT or [`Orchestrator::shutdown_token`] cancellation the
//! workers stop taking deliveries, in-flight executions run to completion,
//! and the PID file is removed.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use centinela_core::config::CentinelaConfig;
use centinela_core::metrics as m;
use centinela_core::module::ModuleRegistry;
use centinela_core::queue::{Lane, TaskConsumer, TaskQueue};
use centinela_core::store::StatusStore;
use centinela_core::types::ScanStatus;
use centinela_engine::{Backends, ModuleRunner, WorkerPool, reconcile_running, recover_orphans};

use crate::health::{
    ComponentHealth, DaemonHealth, HealthStatus, aggregate_status, lane_health, registry_health,
};
use crate::metrics_server;
use crate::pid_file::PidFile;

/// Interval between health reports and uptime gauge updates.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: CentinelaConfig,
    registry: ModuleRegistry,
    backends: Backends,
    shutdown: CancellationToken,
    start_time: Instant,
}

impl Orchestrator {
    /// Load `centinela.toml` (with environment overrides) and build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = CentinelaConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration with the built-in modules.
    pub async fn build_from_config(config: CentinelaConfig) -> Result<Self> {
        let registry = centinela_modules::default_registry(&config.modules)
            .map_err(|e| anyhow::anyhow!("failed to build module registry: {}", e))?;
        Self::build_with_registry(config, registry).await
    }

    /// Build with a caller-supplied module registry.
    pub async fn build_with_registry(
        config: CentinelaConfig,
        registry: ModuleRegistry,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let backends = Backends::open(&config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to open backends: {}", e))?;

        if registry.is_empty() {
            tracing::warn!("no modules registered; every submission will be rejected");
        }
        metrics::gauge!(m::DAEMON_MODULES_REGISTERED).set(registry.len() as f64);

        tracing::info!(
            backends = backends.describe(),
            modules = registry.len(),
            default_workers = config.worker.default_concurrency,
            heavy_workers = config.worker.heavy_concurrency,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            registry,
            backends,
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        })
    }

    pub fn config(&self) -> &CentinelaConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Opened backends, for submitting scans into a running daemon in-process.
    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Cancelling this token stops [`Orchestrator::run`] like a signal would.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until a shutdown signal is received.
    pub async fn run(&self) -> Result<()> {
        let _pid_file = match self.config.general.pid_file.as_str() {
            "" => None,
            path => Some(PidFile::create(path)?),
        };

        match &self.backends {
            Backends::Memory { store, queue } => self.serve(store.clone(), queue.clone()).await,
            Backends::SqliteStore { store, queue } => {
                self.serve(store.clone(), queue.clone()).await
            }
            Backends::Sqlite { store, queue } => self.serve(store.clone(), queue.clone()).await,
        }
    }

    async fn serve<S, Q>(&self, store: Arc<S>, queue: Arc<Q>) -> Result<()>
    where
        S: StatusStore,
        Q: TaskQueue + TaskConsumer,
    {
        if self.config.worker.recover_on_start {
            let recovered = recover_orphans(store.as_ref(), queue.as_ref(), &self.registry)
                .await
                .map_err(|e| anyhow::anyhow!("orphan recovery failed: {}", e))?;
            tracing::info!(recovered, "startup recovery finished");
        }

        let runner = ModuleRunner::new(store.clone(), self.registry.clone(), &self.config.worker);
        let pool = WorkerPool::spawn(
            runner,
            queue,
            &self.config.worker,
            self.shutdown.child_token(),
        );

        let mut reconcile = tokio::time::interval(self.config.worker.reconcile_interval());
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Skip);
        reconcile.reset();
        let mut health = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        health.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let signal = wait_for_shutdown_signal();
        tokio::pin!(signal);

        tracing::info!("centinela-daemon running");
        loop {
            tokio::select! {
                received = &mut signal => {
                    let name = received?;
                    tracing::info!(signal = name, "shutdown signal received");
                    break;
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                _ = reconcile.tick() => {
                    match reconcile_running(store.as_ref()).await {
                        Ok(0) => tracing::debug!("reconciler found nothing to complete"),
                        Ok(completed) => {
                            tracing::info!(completed, "reconciler completed stuck scans")
                        }
                        Err(e) => tracing::warn!(error = %e, "reconcile pass failed"),
                    }
                }
                _ = health.tick() => {
                    let report = self.health(store.as_ref(), &pool).await;
                    if report.status.is_healthy() {
                        tracing::debug!(
                            uptime_secs = report.uptime_secs,
                            running_scans = report.running_scans,
                            "daemon healthy"
                        );
                    } else {
                        tracing::warn!(status = %report.status, "daemon health degraded");
                    }
                }
            }
        }

        self.shutdown.cancel();
        self.backends.close_queue();
        tracing::info!("waiting for in-flight executions to finish");
        pool.join().await;
        tracing::info!("centinela-daemon stopped");
        Ok(())
    }

    /// Probe the store, the registry and every lane.
    async fn health<S: StatusStore>(&self, store: &S, pool: &WorkerPool) -> DaemonHealth {
        let uptime_secs = self.start_time.elapsed().as_secs();
        metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);

        let mut components = Vec::with_capacity(4);
        let running_scans = match store.list_scans(Some(ScanStatus::Running)).await {
            Ok(scans) => {
                components.push(ComponentHealth::new("store", HealthStatus::Healthy));
                Some(scans.len())
            }
            Err(e) => {
                components.push(ComponentHealth::new(
                    "store",
                    HealthStatus::Unhealthy(e.to_string()),
                ));
                None
            }
        };
        components.push(registry_health(self.registry.len()));
        for lane in Lane::ALL {
            components.push(lane_health(
                lane,
                pool.live_workers(lane),
                self.config.worker.concurrency(lane),
            ));
        }

        DaemonHealth {
            status: aggregate_status(&components),
            uptime_secs,
            backends: self.backends.describe(),
            modules_registered: self.registry.len(),
            running_scans,
            components,
        }
    }
}

/// Wait for SIGTERM or SIGINT and return the signal name.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
