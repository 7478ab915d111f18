//! 모듈 실행기
//!
//! 전달 하나마다 [`ModuleRunner::execute`]가 호출됩니다.
//!
//! 1. 실행 행을 `pending → running`으로 선점(claim)합니다. 행이 없으면 아무것도
//!    하지 않습니다. 이미 종료된 행이면 실행 행은 건드리지 않고 3단계만 수행합니다.
//! 2. 모듈을 스캔 대상에 대해 레인별 제한 시간 안에서 실행합니다. 성공하면
//!    결과 문서와 `completed`, 실패(모듈 에러, 미등록 모듈, 시간 초과, 패닉)하면
//!    `{"error", "kind", "module"}` 문서와 `error`를 기록합니다.
//! 3. 형제 실행이 모두 종료되었으면 스캔을 `completed`로 전이합니다.
//!
//! 저장소 에러만 `Err`로 반환됩니다. 워커는 이 경우 전달을 ack하지 않습니다.
//!
//! # 선점 재개
//!
//! 이미 `running`인 행이 전달되면:
//!
//! - 이 실행기가 저장소 에러로 중단한 선점이면 그대로 이어서 처리합니다.
//!   기록하지 못한 결과가 있으면 모듈을 다시 실행하지 않고 그 결과를 기록합니다.
//! - 선점 임대(레인 제한 시간 + `claim_grace_secs`)가 지났으면 선점을 인수하고
//!   모듈을 다시 실행합니다. 프로세스가 실행 도중 종료된 경우입니다.
//! - 그 외에는 다른 실행기가 처리 중이므로 임대가 끝날 때까지 전달을 미룹니다.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use centinela_core::config::WorkerConfig;
use centinela_core::metrics as m;
use centinela_core::module::ModuleRegistry;
use centinela_core::queue::Lane;
use centinela_core::store::{ClaimOutcome, ExecutionOutcome, Settlement, StatusStore};
use centinela_core::types::{ExecutionId, ExecutionStatus, ModuleExecution, ScanId};

use crate::error::EngineError;

/// 실행 결과 문서의 `kind` 값 (모듈 에러 이외)
pub const KIND_UNKNOWN_MODULE: &str = "unknown_module";
pub const KIND_TIMEOUT: &str = "timeout";
pub const KIND_PANIC: &str = "panic";
pub const KIND_CANCELLED: &str = "cancelled";
pub const KIND_MISSING_SCAN: &str = "missing_scan";

/// 전달 하나를 처리한 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// 이번 전달에서 종료 상태를 기록함
    Finished {
        status: ExecutionStatus,
        settlement: Settlement,
    },
    /// 이미 종료된 실행의 재전달 (실행 행은 변경하지 않음)
    Redelivered {
        status: ExecutionStatus,
        settlement: Settlement,
    },
    /// 다른 실행기가 선점 중. `retry_after` 뒤에 다시 전달해야 합니다.
    InFlight { retry_after: Duration },
    /// 실행 행이 없음
    Missing,
}

/// 저장소 에러로 처리가 중단된, 이 실행기가 보유한 선점
#[derive(Debug, Clone)]
struct HeldClaim {
    attempt: u32,
    /// 기록하지 못한 결과. 모듈 실행 전에 중단되었으면 `None`
    outcome: Option<ExecutionOutcome>,
}

/// 모듈 실행기
///
/// 복제본들은 중단된 선점 목록을 공유하므로, 같은 풀의 어느 워커가 재전달을 받아도
/// 선점을 이어받을 수 있습니다.
pub struct ModuleRunner<S> {
    store: Arc<S>,
    registry: ModuleRegistry,
    worker: WorkerConfig,
    held: Arc<Mutex<HashMap<ExecutionId, HeldClaim>>>,
}

impl<S> Clone for ModuleRunner<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: self.registry.clone(),
            worker: self.worker.clone(),
            held: Arc::clone(&self.held),
        }
    }
}

impl<S: StatusStore> ModuleRunner<S> {
    pub fn new(store: Arc<S>, registry: ModuleRegistry, worker: &WorkerConfig) -> Self {
        Self {
            store,
            registry,
            worker: worker.clone(),
            held: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 모듈이 배정되는 레인. 미등록 모듈은 default 레인입니다.
    fn lane_of(&self, module: &str) -> Lane {
        self.registry
            .resolve(module)
            .map(|m| Lane::for_class(m.info().resource_class))
            .unwrap_or(Lane::Default)
    }

    fn held(&self) -> MutexGuard<'_, HashMap<ExecutionId, HeldClaim>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hold(&self, execution: &ModuleExecution, outcome: Option<ExecutionOutcome>) {
        self.held().insert(
            execution.id,
            HeldClaim {
                attempt: execution.attempt,
                outcome,
            },
        );
    }

    /// 현재 선점 토큰과 일치하는 보유 선점을 꺼냅니다. 토큰이 다르면 버립니다.
    fn take_held(&self, id: ExecutionId, attempt: u32) -> Option<HeldClaim> {
        self.held().remove(&id).filter(|held| held.attempt == attempt)
    }

    /// 실행 하나를 처리합니다.
    pub async fn execute(&self, execution_id: ExecutionId) -> Result<RunOutcome, EngineError> {
        let claim = self
            .store
            .claim_execution(execution_id)
            .await
            .inspect_err(|e| error!(execution_id = %execution_id, error = %e, "claim failed"))?;

        match claim {
            ClaimOutcome::Claimed(execution) => self.run_claimed(execution, None).await,
            ClaimOutcome::Missing => {
                self.held().remove(&execution_id);
                warn!(execution_id = %execution_id, "execution not found, dropping task");
                Ok(RunOutcome::Missing)
            }
            ClaimOutcome::AlreadyRunning(current) => self.on_running(current).await,
            ClaimOutcome::AlreadyFinished(status) => {
                self.held().remove(&execution_id);
                self.on_redelivery(execution_id, status).await
            }
        }
    }

    /// 이미 `running`인 행: 보유 선점 재개, 만료 선점 인수, 또는 전달 연기
    async fn on_running(&self, current: ModuleExecution) -> Result<RunOutcome, EngineError> {
        if let Some(held) = self.take_held(current.id, current.attempt) {
            info!(
                scan_id = %current.scan_id,
                execution_id = %current.id,
                module = %current.module,
                attempt = current.attempt,
                result_pending = held.outcome.is_some(),
                "resuming interrupted execution"
            );
            metrics::counter!(
                m::EXECUTIONS_RESUMED_TOTAL,
                m::LABEL_MODULE => current.module.clone(),
                m::LABEL_RESULT => "resumed"
            )
            .increment(1);
            return self.run_claimed(current, held.outcome).await;
        }

        let lease = self.worker.claim_lease(self.lane_of(&current.module));
        let now = Utc::now();
        if !current.claim_expired(lease, now) {
            let retry_after = current.claim_remaining(lease, now);
            debug!(
                execution_id = %current.id,
                module = %current.module,
                attempt = current.attempt,
                retry_after_secs = retry_after.as_secs(),
                "execution claimed elsewhere, deferring delivery"
            );
            return Ok(RunOutcome::InFlight { retry_after });
        }

        let Some(execution) = self
            .store
            .reclaim_execution(current.id, current.attempt)
            .await
            .inspect_err(|e| error!(execution_id = %current.id, error = %e, "reclaim failed"))?
        else {
            // 다른 실행기가 먼저 인수했거나 방금 종료됨
            return Ok(RunOutcome::InFlight {
                retry_after: Duration::ZERO,
            });
        };

        warn!(
            scan_id = %execution.scan_id,
            execution_id = %execution.id,
            module = %execution.module,
            previous_attempt = current.attempt,
            lease_secs = lease.as_secs(),
            "claim expired, taking over execution"
        );
        metrics::counter!(
            m::EXECUTIONS_RESUMED_TOTAL,
            m::LABEL_MODULE => execution.module.clone(),
            m::LABEL_RESULT => "taken_over"
        )
        .increment(1);
        self.run_claimed(execution, None).await
    }

    /// 선점한 실행을 처리합니다. `outcome`이 있으면 모듈을 실행하지 않고 그 결과를 기록합니다.
    async fn run_claimed(
        &self,
        execution: ModuleExecution,
        outcome: Option<ExecutionOutcome>,
    ) -> Result<RunOutcome, EngineError> {
        let outcome = match outcome {
            Some(outcome) => outcome,
            None => match self.invoke(&execution).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.hold(&execution, None);
                    return Err(e);
                }
            },
        };
        let status = outcome.status();

        let recorded = match self
            .store
            .finish_execution(execution.id, execution.attempt, outcome.clone())
            .await
        {
            Ok(recorded) => recorded,
            Err(e) => {
                error!(
                    scan_id = %execution.scan_id,
                    execution_id = %execution.id,
                    module = %execution.module,
                    error = %e,
                    "failed to record execution result"
                );
                self.hold(&execution, Some(outcome));
                return Err(e.into());
            }
        };
        if !recorded {
            warn!(
                execution_id = %execution.id,
                module = %execution.module,
                attempt = execution.attempt,
                "claim lost before result was recorded"
            );
        }

        let settlement = self.settle(execution.scan_id).await?;
        Ok(RunOutcome::Finished { status, settlement })
    }

    async fn on_redelivery(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
    ) -> Result<RunOutcome, EngineError> {
        let Some(execution) = self.store.get_execution(execution_id).await? else {
            return Ok(RunOutcome::Missing);
        };
        metrics::counter!(
            m::EXECUTIONS_REDELIVERED_TOTAL,
            m::LABEL_MODULE => execution.module.clone()
        )
        .increment(1);
        debug!(
            scan_id = %execution.scan_id,
            execution_id = %execution_id,
            module = %execution.module,
            status = %status,
            "redelivery of finished execution, re-checking scan"
        );
        let settlement = self.settle(execution.scan_id).await?;
        Ok(RunOutcome::Redelivered { status, settlement })
    }

    /// 모든 형제 실행이 종료되었으면 스캔을 완료합니다.
    async fn settle(&self, scan_id: ScanId) -> Result<Settlement, EngineError> {
        let settlement = self
            .store
            .complete_scan_if_settled(scan_id)
            .await
            .inspect_err(|e| error!(scan_id = %scan_id, error = %e, "scan aggregation failed"))?;
        match &settlement {
            Settlement::Completed => {
                metrics::counter!(m::SCANS_COMPLETED_TOTAL).increment(1);
                info!(scan_id = %scan_id, "scan completed");
            }
            Settlement::Outstanding(n) => {
                debug!(scan_id = %scan_id, outstanding = n, "scan still has executions in progress")
            }
            Settlement::AlreadyTerminal => {}
            Settlement::Missing => warn!(scan_id = %scan_id, "scan row missing during aggregation"),
        }
        Ok(settlement)
    }

    /// 모듈을 실행하고 종료 결과를 만듭니다.
    ///
    /// 모듈 쪽 실패는 모두 `Failed` 문서가 됩니다. 스캔 조회 중 저장소 에러만 `Err`입니다.
    async fn invoke(&self, execution: &ModuleExecution) -> Result<ExecutionOutcome, EngineError> {
        let name = execution.module.as_str();

        let scan = match self.store.get_scan(execution.scan_id).await {
            Ok(Some(scan)) => scan,
            Ok(None) => {
                return Ok(self.fail(
                    execution,
                    "owning scan not found".to_owned(),
                    KIND_MISSING_SCAN,
                ));
            }
            Err(e) => {
                error!(
                    scan_id = %execution.scan_id,
                    execution_id = %execution.id,
                    error = %e,
                    "scan lookup failed"
                );
                return Err(e.into());
            }
        };

        let module = match self.registry.resolve(name) {
            Ok(module) => module,
            Err(e) => return Ok(self.fail(execution, e.to_string(), KIND_UNKNOWN_MODULE)),
        };

        let lane = Lane::for_class(module.info().resource_class);
        let deadline = self.worker.timeout(lane);
        let target = scan.target.clone();

        debug!(
            scan_id = %execution.scan_id,
            execution_id = %execution.id,
            module = name,
            lane = %lane,
            target = %target,
            attempt = execution.attempt,
            "running module"
        );

        let gauge = metrics::gauge!(m::EXECUTIONS_IN_FLIGHT, m::LABEL_LANE => lane.as_str());
        gauge.increment(1.0);
        let started = Instant::now();

        // 별도 태스크에서 실행해야 패닉이 JoinError로 격리됨
        let handle = tokio::spawn(async move { module.execute(&target).await });
        let abort = handle.abort_handle();
        let joined = tokio::time::timeout(deadline, handle).await;

        gauge.decrement(1.0);
        metrics::histogram!(m::EXECUTION_DURATION_SECONDS, m::LABEL_MODULE => name.to_owned())
            .record(started.elapsed().as_secs_f64());

        Ok(match joined {
            Ok(Ok(Ok(document))) => {
                metrics::counter!(
                    m::EXECUTIONS_FINISHED_TOTAL,
                    m::LABEL_MODULE => name.to_owned(),
                    m::LABEL_RESULT => "completed"
                )
                .increment(1);
                info!(
                    scan_id = %execution.scan_id,
                    execution_id = %execution.id,
                    module = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "module completed"
                );
                ExecutionOutcome::Completed(document)
            }
            Ok(Ok(Err(module_err))) => {
                self.fail(execution, module_err.to_string(), module_err.kind())
            }
            Ok(Err(join_err)) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                self.fail(execution, format!("module panicked: {message}"), KIND_PANIC)
            }
            Ok(Err(join_err)) => self.fail(execution, join_err.to_string(), KIND_CANCELLED),
            Err(_) => {
                abort.abort();
                self.fail(
                    execution,
                    format!("module exceeded the {}s {lane} lane deadline", deadline.as_secs()),
                    KIND_TIMEOUT,
                )
            }
        })
    }

    fn fail(
        &self,
        execution: &ModuleExecution,
        message: String,
        kind: &'static str,
    ) -> ExecutionOutcome {
        metrics::counter!(
            m::EXECUTIONS_FINISHED_TOTAL,
            m::LABEL_MODULE => execution.module.clone(),
            m::LABEL_RESULT => "error"
        )
        .increment(1);
        metrics::counter!(
            m::EXECUTIONS_ERRORS_TOTAL,
            m::LABEL_MODULE => execution.module.clone(),
            m::LABEL_KIND => kind
        )
        .increment(1);
        warn!(
            scan_id = %execution.scan_id,
            execution_id = %execution.id,
            module = %execution.module,
            kind,
            error = %message,
            "module execution failed"
        );
        ExecutionOutcome::Failed(error_document(&execution.module, kind, &message))
    }
}

/// 실패 결과 문서
pub fn error_document(module: &str, kind: &str, message: &str) -> Value {
    json!({
        "error": message,
        "kind": kind,
        "module": module,
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::store::MemoryStatusStore;
    use centinela_core::error::{ModuleError, StoreError};
    use centinela_core::module::{ModuleInfo, ResourceClass, ScanModule};
    use centinela_core::types::{Scan, ScanStatus, Target};

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    struct TestModule {
        info: ModuleInfo,
        behaviour: Behaviour,
    }

    impl TestModule {
        fn new(name: &str, behaviour: Behaviour) -> Self {
            Self {
                info: ModuleInfo::new(name, "test module", ResourceClass::Standard),
                behaviour,
            }
        }
    }

    impl ScanModule for TestModule {
        fn info(&self) -> &ModuleInfo {
            &self.info
        }

        async fn execute(&self, target: &Target) -> Result<Value, ModuleError> {
            match self.behaviour {
                Behaviour::Succeed => Ok(json!({ "target": target.value() })),
                Behaviour::Fail => Err(ModuleError::Network("connection refused".to_owned())),
                Behaviour::Panic => panic!("boom"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(json!({}))
                }
            }
        }
    }

    fn registry() -> ModuleRegistry {
        ModuleRegistry::builder()
            .register(TestModule::new("ok", Behaviour::Succeed))
            .unwrap()
            .register(TestModule::new("fail", Behaviour::Fail))
            .unwrap()
            .register(TestModule::new("panic", Behaviour::Panic))
            .unwrap()
            .register(TestModule::new("hang", Behaviour::Hang))
            .unwrap()
            .build()
    }

    /// 지정한 횟수만큼 `get_scan` / `finish_execution`이 실패하는 저장소
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStatusStore,
        get_scan_failures: AtomicU32,
        finish_failures: AtomicU32,
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    impl StatusStore for FlakyStore {
        async fn create_scan(
            &self,
            scan: &Scan,
            executions: &[ModuleExecution],
        ) -> Result<(), StoreError> {
            self.inner.create_scan(scan, executions).await
        }

        async fn get_scan(&self, id: ScanId) -> Result<Option<Scan>, StoreError> {
            if take_failure(&self.get_scan_failures) {
                return Err(StoreError::Query("database is locked".to_owned()));
            }
            self.inner.get_scan(id).await
        }

        async fn list_scans(&self, status: Option<ScanStatus>) -> Result<Vec<Scan>, StoreError> {
            self.inner.list_scans(status).await
        }

        async fn get_execution(
            &self,
            id: ExecutionId,
        ) -> Result<Option<ModuleExecution>, StoreError> {
            self.inner.get_execution(id).await
        }

        async fn list_executions(
            &self,
            scan_id: ScanId,
        ) -> Result<Vec<ModuleExecution>, StoreError> {
            self.inner.list_executions(scan_id).await
        }

        async fn pending_executions(&self) -> Result<Vec<ModuleExecution>, StoreError> {
            self.inner.pending_executions().await
        }

        async fn running_executions(&self) -> Result<Vec<ModuleExecution>, StoreError> {
            self.inner.running_executions().await
        }

        async fn claim_execution(&self, id: ExecutionId) -> Result<ClaimOutcome, StoreError> {
            self.inner.claim_execution(id).await
        }

        async fn reclaim_execution(
            &self,
            id: ExecutionId,
            expected_attempt: u32,
        ) -> Result<Option<ModuleExecution>, StoreError> {
            self.inner.reclaim_execution(id, expected_attempt).await
        }

        async fn finish_execution(
            &self,
            id: ExecutionId,
            attempt: u32,
            outcome: ExecutionOutcome,
        ) -> Result<bool, StoreError> {
            if take_failure(&self.finish_failures) {
                return Err(StoreError::Query("disk I/O error".to_owned()));
            }
            self.inner.finish_execution(id, attempt, outcome).await
        }

        async fn complete_scan_if_settled(
            &self,
            scan_id: ScanId,
        ) -> Result<Settlement, StoreError> {
            self.inner.complete_scan_if_settled(scan_id).await
        }
    }

    fn test_worker() -> WorkerConfig {
        WorkerConfig {
            default_timeout_secs: 1,
            ..WorkerConfig::default()
        }
    }

    async fn setup_with<S: StatusStore>(
        store: S,
        worker: &WorkerConfig,
        modules: &[&str],
    ) -> (ModuleRunner<S>, Arc<S>, Scan, Vec<ModuleExecution>) {
        let store = Arc::new(store);
        let scan = Scan::new_running("tester", Target::parse("example.com").unwrap());
        let execs: Vec<_> = modules
            .iter()
            .map(|m| ModuleExecution::new_pending(scan.id, *m))
            .collect();
        store.create_scan(&scan, &execs).await.unwrap();
        let runner = ModuleRunner::new(store.clone(), registry(), worker);
        (runner, store, scan, execs)
    }

    async fn setup(
        modules: &[&str],
    ) -> (
        ModuleRunner<MemoryStatusStore>,
        Arc<MemoryStatusStore>,
        Scan,
        Vec<ModuleExecution>,
    ) {
        setup_with(MemoryStatusStore::new(), &test_worker(), modules).await
    }

    #[tokio::test]
    async fn success_records_document_and_completes_scan() {
        let (runner, store, scan, execs) = setup(&["ok"]).await;
        let outcome = runner.execute(execs[0].id).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Finished {
                status: ExecutionStatus::Completed,
                settlement: Settlement::Completed
            }
        );
        let exec = store.get_execution(execs[0].id).await.unwrap().unwrap();
        assert_eq!(exec.result, json!({ "target": "example.com" }));
        assert_eq!(
            store.get_scan(scan.id).await.unwrap().unwrap().status,
            ScanStatus::Completed
        );
    }

    #[tokio::test]
    async fn module_error_becomes_error_document() {
        let (runner, store, _scan, execs) = setup(&["fail"]).await;
        runner.execute(execs[0].id).await.unwrap();
        let exec = store.get_execution(execs[0].id).await.unwrap().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Error);
        assert_eq!(exec.result["kind"], "network");
        assert_eq!(exec.result["module"], "fail");
        assert_eq!(exec.result["error"], "network error: connection refused");
    }

    #[tokio::test]
    async fn panic_is_isolated() {
        let (runner, store, scan, execs) = setup(&["panic", "ok"]).await;
        let outcome = runner.execute(execs[0].id).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Finished {
                status: ExecutionStatus::Error,
                settlement: Settlement::Outstanding(1)
            }
        );
        let exec = store.get_execution(execs[0].id).await.unwrap().unwrap();
        assert_eq!(exec.result["kind"], KIND_PANIC);
        assert!(exec.result["error"].as_str().unwrap().contains("boom"));

        runner.execute(execs[1].id).await.unwrap();
        assert_eq!(
            store.get_scan(scan.id).await.unwrap().unwrap().status,
            ScanStatus::Completed
        );
    }

    #[tokio::test]
    async fn deadline_expiry_is_timeout_error() {
        let (runner, store, _scan, execs) = setup(&["hang"]).await;
        runner.execute(execs[0].id).await.unwrap();
        let exec = store.get_execution(execs[0].id).await.unwrap().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Error);
        assert_eq!(exec.result["kind"], KIND_TIMEOUT);
    }

    #[tokio::test]
    async fn unregistered_module_is_recorded_as_error() {
        let (runner, store, _scan, execs) = setup(&["retired"]).await;
        runner.execute(execs[0].id).await.unwrap();
        let exec = store.get_execution(execs[0].id).await.unwrap().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Error);
        assert_eq!(exec.result["kind"], KIND_UNKNOWN_MODULE);
    }

    #[tokio::test]
    async fn redelivery_after_finish_changes_nothing() {
        let (runner, store, _scan, execs) = setup(&["ok"]).await;
        runner.execute(execs[0].id).await.unwrap();
        let before = store.get_execution(execs[0].id).await.unwrap().unwrap();

        let outcome = runner.execute(execs[0].id).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Redelivered {
                status: ExecutionStatus::Completed,
                settlement: Settlement::AlreadyTerminal
            }
        );
        assert_eq!(store.get_execution(execs[0].id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn live_claim_defers_and_missing_is_noop() {
        let (runner, store, _scan, execs) = setup(&["ok"]).await;
        store.claim_execution(execs[0].id).await.unwrap();

        // 임대 = 제한 시간 1초 + 기본 여유 60초
        let outcome = runner.execute(execs[0].id).await.unwrap();
        let RunOutcome::InFlight { retry_after } = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert!(retry_after > Duration::from_secs(55));
        let exec = store.get_execution(execs[0].id).await.unwrap().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert_eq!(exec.attempt, 1);

        assert_eq!(
            runner.execute(ExecutionId::new()).await.unwrap(),
            RunOutcome::Missing
        );
    }

    #[tokio::test]
    async fn record_failure_is_resumed_on_redelivery() {
        // Given: 결과 기록이 한 번 실패하는 저장소
        let store = FlakyStore {
            finish_failures: AtomicU32::new(1),
            ..FlakyStore::default()
        };
        let (runner, store, scan, execs) = setup_with(store, &test_worker(), &["ok"]).await;

        // When: 첫 전달은 저장소 에러
        let first = runner.execute(execs[0].id).await;
        assert!(matches!(first, Err(EngineError::Store(_))), "got {first:?}");
        let stuck = store.get_execution(execs[0].id).await.unwrap().unwrap();
        assert_eq!(stuck.status, ExecutionStatus::Running);

        // Then: 재전달이 보류된 결과를 기록하고 스캔을 완료
        let second = runner.clone().execute(execs[0].id).await.unwrap();
        assert_eq!(
            second,
            RunOutcome::Finished {
                status: ExecutionStatus::Completed,
                settlement: Settlement::Completed
            }
        );
        let exec = store.get_execution(execs[0].id).await.unwrap().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.result, json!({ "target": "example.com" }));
        assert_eq!(exec.attempt, 1);
        assert_eq!(
            store.get_scan(scan.id).await.unwrap().unwrap().status,
            ScanStatus::Completed
        );
    }

    #[tokio::test]
    async fn scan_lookup_failure_is_retried_not_recorded() {
        // Given: 스캔 조회가 한 번 실패하는 저장소
        let store = FlakyStore {
            get_scan_failures: AtomicU32::new(1),
            ..FlakyStore::default()
        };
        let (runner, store, scan, execs) = setup_with(store, &test_worker(), &["ok"]).await;

        // When: 첫 전달은 에러 문서를 남기지 않고 실패
        let first = runner.execute(execs[0].id).await;
        assert!(matches!(first, Err(EngineError::Store(_))), "got {first:?}");
        let exec = store.get_execution(execs[0].id).await.unwrap().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert_eq!(exec.result, json!({}));

        // Then: 재전달에서 모듈이 실행됨
        runner.execute(execs[0].id).await.unwrap();
        let exec = store.get_execution(execs[0].id).await.unwrap().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.result, json!({ "target": "example.com" }));
        assert_eq!(
            store.get_scan(scan.id).await.unwrap().unwrap().status,
            ScanStatus::Completed
        );
    }

    #[tokio::test]
    async fn expired_claim_is_taken_over() {
        // Given: 다른 프로세스가 선점한 뒤 사라진 실행 (임대 1초)
        let worker = WorkerConfig {
            default_timeout_secs: 1,
            claim_grace_secs: 0,
            ..WorkerConfig::default()
        };
        let (runner, store, scan, execs) =
            setup_with(MemoryStatusStore::new(), &worker, &["ok"]).await;
        store.claim_execution(execs[0].id).await.unwrap();

        // When: 임대 안에서는 연기, 임대가 지나면 인수
        let early = runner.execute(execs[0].id).await.unwrap();
        let RunOutcome::InFlight { retry_after } = early else {
            panic!("unexpected outcome: {early:?}");
        };
        assert!(retry_after <= Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let outcome = runner.execute(execs[0].id).await.unwrap();

        // Then
        assert_eq!(
            outcome,
            RunOutcome::Finished {
                status: ExecutionStatus::Completed,
                settlement: Settlement::Completed
            }
        );
        let exec = store.get_execution(execs[0].id).await.unwrap().unwrap();
        assert_eq!(exec.attempt, 2);
        assert_eq!(exec.result, json!({ "target": "example.com" }));
        assert_eq!(
            store.get_scan(scan.id).await.unwrap().unwrap().status,
            ScanStatus::Completed
        );
    }

    #[test]
    fn panic_payloads_are_stringified() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic payload");
    }
}
