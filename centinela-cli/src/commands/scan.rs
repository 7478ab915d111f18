//! `centinela scan` command handler
//!
//! Submits a scan and processes it with worker pools embedded in this
//! process, then prints the report. With a sqlite queue, a running daemon
//! may pick up some of the tasks instead; the result is the same.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use centinela_core::config::CentinelaConfig;
use centinela_core::module::ModuleRegistry;
use centinela_core::queue::{TaskConsumer, TaskQueue};
use centinela_core::store::StatusStore;
use centinela_engine::{
    Backends, ModuleRunner, ScanCoordinator, ScanOutcome, ScanReport, ScanRequest, WorkerPool,
    wait_until_settled,
};

use crate::cli::ScanArgs;
use crate::commands::status::ReportView;
use crate::error::CliError;
use crate::output::OutputWriter;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Execute the `scan` command.
pub async fn execute(
    args: ScanArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::load_config(config_path).await?;
    let registry = super::build_registry(&config)?;
    let backends = Backends::open(&config).await?;

    let report = run(&backends, &config, registry, args.target.to_request(), args.timeout()).await?;
    writer.render(&ReportView::new(&report, false))?;

    match report.summary.outcome {
        ScanOutcome::Failed => Err(CliError::Scan(format!(
            "all {} module(s) failed",
            report.summary.total
        ))),
        _ => Ok(()),
    }
}

/// Run one scan to completion against already-opened backends.
pub async fn run(
    backends: &Backends,
    config: &CentinelaConfig,
    registry: ModuleRegistry,
    request: ScanRequest,
    timeout: Duration,
) -> Result<ScanReport, CliError> {
    match backends {
        Backends::Memory { store, queue } => {
            run_embedded(store.clone(), queue.clone(), config, registry, request, timeout).await
        }
        Backends::SqliteStore { store, queue } => {
            run_embedded(store.clone(), queue.clone(), config, registry, request, timeout).await
        }
        Backends::Sqlite { store, queue } => {
            run_embedded(store.clone(), queue.clone(), config, registry, request, timeout).await
        }
    }
}

async fn run_embedded<S, Q>(
    store: Arc<S>,
    queue: Arc<Q>,
    config: &CentinelaConfig,
    registry: ModuleRegistry,
    request: ScanRequest,
    timeout: Duration,
) -> Result<ScanReport, CliError>
where
    S: StatusStore,
    Q: TaskQueue + TaskConsumer,
{
    let shutdown = CancellationToken::new();
    let runner = ModuleRunner::new(store.clone(), registry.clone(), &config.worker);
    let pool = WorkerPool::spawn(runner, queue.clone(), &config.worker, shutdown.clone());

    let coordinator = ScanCoordinator::new(store.clone(), queue, registry);
    let result = match coordinator.submit_scan(request).await {
        Ok(scan_id) => {
            info!(scan_id = %scan_id, "scan submitted, waiting for modules");
            wait_until_settled(store.as_ref(), scan_id, POLL_INTERVAL, timeout).await
        }
        Err(e) => Err(e),
    };

    shutdown.cancel();
    pool.join().await;
    Ok(result?)
}
