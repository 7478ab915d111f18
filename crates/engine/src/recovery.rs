//! 고아 실행 복구와 스캔 재정산
//!
//! - [`recover_orphans`]: `pending`이나 `running`으로 남은 실행을 다시 제출합니다.
//!   인메모리 큐는 재시작 시 작업을 잃으므로 시작 시점의 `pending` 행은 모두 고아입니다.
//!   `running` 행은 이전 프로세스가 선점한 채 죽었을 수 있으므로 함께 제출하며,
//!   실행기가 임대 만료 후 인수합니다. 중복 제출은 실행기의 선점(compare-and-set)이 흡수합니다.
//! - [`reconcile_running`]: `running` 스캔마다 정산을 다시 시도합니다.
//!   정산 저장이 실패한 뒤 재전달이 없어도 스캔이 결국 완료됩니다.

use tracing::{debug, info, warn};

use centinela_core::metrics as m;
use centinela_core::module::ModuleRegistry;
use centinela_core::queue::{Lane, ModuleTask, TaskQueue};
use centinela_core::store::{Settlement, StatusStore};
use centinela_core::types::ScanStatus;

use crate::error::EngineError;

/// `pending`/`running` 실행을 레인에 다시 제출하고 제출 수를 반환합니다.
///
/// 레지스트리에 없는 모듈은 default 레인으로 보내며, 실행기가 `error`로 기록합니다.
pub async fn recover_orphans<S, Q>(
    store: &S,
    queue: &Q,
    registry: &ModuleRegistry,
) -> Result<usize, EngineError>
where
    S: StatusStore,
    Q: TaskQueue,
{
    let mut orphans = store.pending_executions().await?;
    orphans.extend(store.running_executions().await?);
    if orphans.is_empty() {
        debug!("no orphaned executions");
        return Ok(0);
    }

    let mut resubmitted = 0;
    for execution in orphans {
        let lane = match registry.resolve(&execution.module) {
            Ok(module) => Lane::for_class(module.info().resource_class),
            Err(_) => {
                warn!(
                    execution_id = %execution.id,
                    module = %execution.module,
                    "orphaned execution references an unregistered module"
                );
                Lane::Default
            }
        };
        queue
            .submit(ModuleTask {
                execution_id: execution.id,
                scan_id: execution.scan_id,
                module: execution.module.clone(),
                lane,
            })
            .await?;
        metrics::counter!(m::QUEUE_TASKS_SUBMITTED_TOTAL, m::LABEL_LANE => lane.as_str())
            .increment(1);
        resubmitted += 1;
    }

    metrics::counter!(m::DAEMON_ORPHANS_RECOVERED_TOTAL).increment(resubmitted as u64);
    info!(resubmitted, "orphaned executions resubmitted");
    Ok(resubmitted)
}

/// `running` 스캔의 정산을 다시 시도하고 완료된 스캔 수를 반환합니다.
pub async fn reconcile_running<S: StatusStore>(store: &S) -> Result<usize, EngineError> {
    let running = store.list_scans(Some(ScanStatus::Running)).await?;
    let mut completed = 0;
    for scan in running {
        if store.complete_scan_if_settled(scan.id).await? == Settlement::Completed {
            metrics::counter!(m::SCANS_COMPLETED_TOTAL).increment(1);
            info!(scan_id = %scan.id, "stuck scan completed by reconciler");
            completed += 1;
        }
    }
    if completed > 0 {
        metrics::counter!(m::DAEMON_SCANS_RECONCILED_TOTAL).increment(completed as u64);
    }
    Ok(completed)
}
