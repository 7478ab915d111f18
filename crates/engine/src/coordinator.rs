//! 스캔 조정자 -- 제출 검증, 행 생성, 작업 분배
//!
//! [`ScanCoordinator::submit_scan`]은 다음 순서로 동작합니다.
//!
//! 1. 요청 검증 (요청자, 모듈 집합, 대상). 실패하면 아무 행도 만들지 않습니다.
//! 2. 스캔(`running`)과 모듈별 실행 행(`pending`)을 한 번의 원자적 쓰기로 저장합니다.
//! 3. 실행 행마다 작업 하나를 자원 등급에 맞는 레인에 제출합니다.
//!
//! 작업은 행이 저장된 뒤에만 제출되므로 실행기는 항상 존재하는 행을 만납니다.
//! 제출 도중 큐가 실패하면 남은 실행은 `pending`으로 남고
//! 데몬 시작 시 고아 복구(`recovery`)가 다시 제출합니다.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use centinela_core::error::SubmissionError;
use centinela_core::metrics as m;
use centinela_core::module::ModuleRegistry;
use centinela_core::queue::{Lane, ModuleTask, TaskQueue};
use centinela_core::store::StatusStore;
use centinela_core::types::{ModuleExecution, Scan, ScanId, Target};

use crate::error::EngineError;

/// 스캔 제출 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    /// 요청자 식별자
    pub owner: String,
    /// 원본 대상 문자열 (도메인 또는 IP)
    pub target: String,
    /// 실행할 모듈 이름 목록
    pub modules: Vec<String>,
}

impl ScanRequest {
    pub fn new<I, M>(owner: impl Into<String>, target: impl Into<String>, modules: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            owner: owner.into(),
            target: target.into(),
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }
}

/// 검증을 통과한 요청
struct ValidatedRequest {
    owner: String,
    target: Target,
    modules: Vec<(String, Lane)>,
}

/// 스캔 조정자
pub struct ScanCoordinator<S, Q> {
    store: Arc<S>,
    queue: Arc<Q>,
    registry: ModuleRegistry,
}

impl<S, Q> ScanCoordinator<S, Q>
where
    S: StatusStore,
    Q: TaskQueue,
{
    pub fn new(store: Arc<S>, queue: Arc<Q>, registry: ModuleRegistry) -> Self {
        Self {
            store,
            queue,
            registry,
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// 요청을 검증합니다. 저장소나 큐에는 접근하지 않습니다.
    fn validate(&self, request: &ScanRequest) -> Result<ValidatedRequest, SubmissionError> {
        let owner = request.owner.trim();
        if owner.is_empty() {
            return Err(SubmissionError::MissingOwner);
        }
        if request.modules.is_empty() {
            return Err(SubmissionError::NoModules);
        }

        let mut seen = HashSet::with_capacity(request.modules.len());
        let mut modules = Vec::with_capacity(request.modules.len());
        for name in &request.modules {
            if !seen.insert(name.as_str()) {
                return Err(SubmissionError::DuplicateModule { name: name.clone() });
            }
            let module = self.registry.resolve(name)?;
            modules.push((name.clone(), Lane::for_class(module.info().resource_class)));
        }

        let target = Target::parse(&request.target)?;

        Ok(ValidatedRequest {
            owner: owner.to_owned(),
            target,
            modules,
        })
    }

    /// 스캔을 제출하고 스캔 ID를 반환합니다.
    ///
    /// 멱등하지 않습니다. 같은 요청을 다시 보내면 새 스캔이 만들어집니다.
    pub async fn submit_scan(&self, request: ScanRequest) -> Result<ScanId, EngineError> {
        let validated = match self.validate(&request) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    owner = %request.owner,
                    target = %request.target,
                    error = %e,
                    "scan rejected"
                );
                metrics::counter!(m::SCANS_REJECTED_TOTAL, m::LABEL_KIND => e.kind()).increment(1);
                return Err(e.into());
            }
        };

        let scan = Scan::new_running(validated.owner, validated.target);
        let executions: Vec<ModuleExecution> = validated
            .modules
            .iter()
            .map(|(name, _)| ModuleExecution::new_pending(scan.id, name.as_str()))
            .collect();

        self.store.create_scan(&scan, &executions).await?;
        metrics::counter!(m::SCANS_SUBMITTED_TOTAL).increment(1);
        info!(
            scan_id = %scan.id,
            owner = %scan.owner,
            target = %scan.target,
            modules = executions.len(),
            "scan persisted"
        );

        for (submitted, (execution, (_, lane))) in
            executions.iter().zip(&validated.modules).enumerate()
        {
            let task = ModuleTask {
                execution_id: execution.id,
                scan_id: scan.id,
                module: execution.module.clone(),
                lane: *lane,
            };
            if let Err(source) = self.queue.submit(task).await {
                warn!(
                    scan_id = %scan.id,
                    execution_id = %execution.id,
                    submitted,
                    error = %source,
                    "task dispatch failed, remaining executions stay pending"
                );
                return Err(EngineError::Dispatch {
                    scan_id: scan.id,
                    submitted,
                    source,
                });
            }
            metrics::counter!(m::QUEUE_TASKS_SUBMITTED_TOTAL, m::LABEL_LANE => lane.as_str())
                .increment(1);
            debug!(
                scan_id = %scan.id,
                execution_id = %execution.id,
                module = %execution.module,
                lane = %lane,
                "task submitted"
            );
        }

        Ok(scan.id)
    }
}
