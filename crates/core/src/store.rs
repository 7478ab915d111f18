//! 상태 저장소 trait
//!
//! [`StatusStore`]는 스캔과 모듈 실행 행을 보관합니다.
//! 조정자(coordinator)와 실행기(runner)는 이 저장소를 통해서만 통신합니다.
//!
//! 모든 변경 연산은 원자적이어야 합니다. 특히
//! [`StatusStore::complete_scan_if_settled`]는 "종료되지 않은 형제 실행이 없으면
//! 스캔을 completed로 설정"을 단일 조건부 갱신으로 수행해야 하며,
//! 동시에 끝난 형제 실행들 사이에서 전이가 유실되지 않아야 합니다.
//!
//! 선점할 때마다 실행 행의 `attempt`가 증가하고 `claimed_at`이 기록됩니다.
//! `attempt`는 선점 토큰입니다. 종료 기록과 인수(reclaim)는 토큰이 일치할 때만 적용되므로
//! 만료된 선점을 다른 실행기가 인수한 뒤에는 이전 소유자의 기록이 무시됩니다.

use std::future::Future;

use crate::error::StoreError;
use crate::types::{ExecutionId, ExecutionStatus, ModuleExecution, Scan, ScanId, ScanStatus};

/// 실행 행 선점 결과
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// `pending → running` 전이 성공. 전이 후 행을 담습니다.
    Claimed(ModuleExecution),
    /// 이미 `running`. 현재 선점 토큰과 선점 시각을 담은 행을 돌려줍니다.
    AlreadyRunning(ModuleExecution),
    /// 이미 종료 상태 (재전달)
    AlreadyFinished(ExecutionStatus),
    /// 행이 존재하지 않음
    Missing,
}

/// 종료 전이에 기록할 결과
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// 모듈 성공 결과 문서
    Completed(serde_json::Value),
    /// 에러 문서 (`{"error": ..., "kind": ...}`)
    Failed(serde_json::Value),
}

impl ExecutionOutcome {
    /// 기록될 종료 상태
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::Completed(_) => ExecutionStatus::Completed,
            Self::Failed(_) => ExecutionStatus::Error,
        }
    }

    /// 결과 문서를 참조합니다.
    pub fn document(&self) -> &serde_json::Value {
        match self {
            Self::Completed(v) | Self::Failed(v) => v,
        }
    }
}

/// 스캔 정산(집계) 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// 이번 호출에서 `running → completed` 전이가 일어남
    Completed,
    /// 스캔이 이미 종료 상태
    AlreadyTerminal,
    /// 종료되지 않은 실행이 남아 있음 (개수)
    Outstanding(usize),
    /// 스캔 행이 존재하지 않음
    Missing,
}

/// 스캔/모듈 실행 상태 저장소
pub trait StatusStore: Send + Sync + 'static {
    /// 스캔과 그 실행 행들을 한 번의 원자적 쓰기로 생성합니다.
    ///
    /// 실패하면 어떤 행도 남지 않습니다.
    fn create_scan(
        &self,
        scan: &Scan,
        executions: &[ModuleExecution],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 스캔 행을 조회합니다.
    fn get_scan(&self, id: ScanId)
    -> impl Future<Output = Result<Option<Scan>, StoreError>> + Send;

    /// 상태 필터(선택)로 스캔 목록을 생성 시각 순으로 조회합니다.
    fn list_scans(
        &self,
        status: Option<ScanStatus>,
    ) -> impl Future<Output = Result<Vec<Scan>, StoreError>> + Send;

    /// 실행 행을 조회합니다.
    fn get_execution(
        &self,
        id: ExecutionId,
    ) -> impl Future<Output = Result<Option<ModuleExecution>, StoreError>> + Send;

    /// 스캔에 속한 실행 행들을 조회합니다.
    fn list_executions(
        &self,
        scan_id: ScanId,
    ) -> impl Future<Output = Result<Vec<ModuleExecution>, StoreError>> + Send;

    /// 아직 `pending`인 모든 실행 행을 조회합니다 (고아 작업 복구용).
    fn pending_executions(
        &self,
    ) -> impl Future<Output = Result<Vec<ModuleExecution>, StoreError>> + Send;

    /// `running`인 모든 실행 행을 조회합니다 (중단된 선점 복구용).
    fn running_executions(
        &self,
    ) -> impl Future<Output = Result<Vec<ModuleExecution>, StoreError>> + Send;

    /// 실행 행을 원자적으로 `pending → running` 전이시킵니다.
    ///
    /// 성공하면 `attempt`가 1 증가하고 `claimed_at`이 현재 시각이 됩니다.
    fn claim_execution(
        &self,
        id: ExecutionId,
    ) -> impl Future<Output = Result<ClaimOutcome, StoreError>> + Send;

    /// `running` 행의 선점을 인수합니다.
    ///
    /// 행이 여전히 `running`이고 `attempt`가 `expected_attempt`와 같을 때만
    /// `attempt`를 증가시키고 `claimed_at`을 갱신합니다. 그 사이에 다른 실행기가
    /// 인수했거나 행이 종료되었으면 `None`을 반환합니다.
    fn reclaim_execution(
        &self,
        id: ExecutionId,
        expected_attempt: u32,
    ) -> impl Future<Output = Result<Option<ModuleExecution>, StoreError>> + Send;

    /// 실행 행을 원자적으로 `running → {completed|error}` 전이시키고 결과를 저장합니다.
    ///
    /// 행이 `running`이 아니거나 선점 토큰(`attempt`)이 다르면 아무것도 쓰지 않고
    /// `false`를 반환합니다.
    fn finish_execution(
        &self,
        id: ExecutionId,
        attempt: u32,
        outcome: ExecutionOutcome,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// 종료되지 않은 형제 실행이 없으면 스캔을 `completed`로 설정합니다.
    ///
    /// 멱등적입니다. 이미 완료된 스캔에 대해 다시 호출해도 안전합니다.
    fn complete_scan_if_settled(
        &self,
        scan_id: ScanId,
    ) -> impl Future<Output = Result<Settlement, StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_maps_to_terminal_status() {
        let ok = ExecutionOutcome::Completed(json!({"records": []}));
        let err = ExecutionOutcome::Failed(json!({"error": "boom"}));
        assert_eq!(ok.status(), ExecutionStatus::Completed);
        assert_eq!(err.status(), ExecutionStatus::Error);
        assert!(ok.status().is_terminal());
        assert_eq!(err.document()["error"], "boom");
    }
}
