//! 스캔 보고서
//!
//! 스캔 상태는 부분 실패와 관계없이 `completed`로 끝나므로, 결과의 성격은
//! 읽기 시점에 실행 행들로부터 [`ScanSummary`]로 계산합니다.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use centinela_core::store::StatusStore;
use centinela_core::types::{ExecutionStatus, ModuleExecution, Scan, ScanId};

use crate::error::EngineError;

/// 실행 결과 종합
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    /// 모든 실행이 completed
    Succeeded,
    /// completed와 error가 섞임
    Partial,
    /// 모든 실행이 error
    Failed,
    /// 아직 종료되지 않은 실행이 있음
    InProgress,
}

impl std::fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::InProgress => "in_progress",
        };
        f.write_str(s)
    }
}

/// 실행 상태별 개수
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub errored: usize,
    pub outcome: ScanOutcome,
}

impl ScanSummary {
    pub fn from_executions(executions: &[ModuleExecution]) -> Self {
        let count = |status| executions.iter().filter(|e| e.status == status).count();
        let pending = count(ExecutionStatus::Pending);
        let running = count(ExecutionStatus::Running);
        let completed = count(ExecutionStatus::Completed);
        let errored = count(ExecutionStatus::Error);

        let outcome = if pending + running > 0 {
            ScanOutcome::InProgress
        } else if errored == 0 {
            ScanOutcome::Succeeded
        } else if completed == 0 {
            ScanOutcome::Failed
        } else {
            ScanOutcome::Partial
        };

        Self {
            total: executions.len(),
            pending,
            running,
            completed,
            errored,
            outcome,
        }
    }
}

/// 스캔 하나의 전체 보고서
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan: Scan,
    pub executions: Vec<ModuleExecution>,
    pub summary: ScanSummary,
}

impl ScanReport {
    /// 저장소에서 보고서를 읽습니다.
    pub async fn load<S: StatusStore>(store: &S, scan_id: ScanId) -> Result<Self, EngineError> {
        let scan = store
            .get_scan(scan_id)
            .await?
            .ok_or(EngineError::ScanNotFound(scan_id))?;
        let executions = store.list_executions(scan_id).await?;
        let summary = ScanSummary::from_executions(&executions);
        Ok(Self {
            scan,
            executions,
            summary,
        })
    }

    /// 스캔이 종료 상태이면 `true`
    pub fn is_settled(&self) -> bool {
        self.scan.status.is_terminal()
    }
}

/// 스캔이 종료될 때까지 `poll` 간격으로 확인합니다.
pub async fn wait_until_settled<S: StatusStore>(
    store: &S,
    scan_id: ScanId,
    poll: Duration,
    timeout: Duration,
) -> Result<ScanReport, EngineError> {
    let started = Instant::now();
    loop {
        let report = ScanReport::load(store, scan_id).await?;
        if report.is_settled() {
            return Ok(report);
        }
        if started.elapsed() >= timeout {
            return Err(EngineError::WaitTimeout {
                scan_id,
                waited: started.elapsed(),
            });
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStatusStore;
    use centinela_core::store::{ExecutionOutcome, StatusStore};
    use centinela_core::types::Target;
    use serde_json::json;

    fn exec(status: ExecutionStatus) -> ModuleExecution {
        ModuleExecution {
            status,
            ..ModuleExecution::new_pending(ScanId::new(), "dns")
        }
    }

    #[test]
    fn outcome_classification() {
        use ExecutionStatus::*;
        let cases = [
            (vec![Completed, Completed], ScanOutcome::Succeeded),
            (vec![Completed, Error], ScanOutcome::Partial),
            (vec![Error, Error], ScanOutcome::Failed),
            (vec![Completed, Running], ScanOutcome::InProgress),
            (vec![Pending], ScanOutcome::InProgress),
        ];
        for (statuses, expected) in cases {
            let execs: Vec<_> = statuses.into_iter().map(exec).collect();
            assert_eq!(ScanSummary::from_executions(&execs).outcome, expected);
        }
    }

    #[test]
    fn summary_counts() {
        let execs = vec![
            exec(ExecutionStatus::Completed),
            exec(ExecutionStatus::Error),
            exec(ExecutionStatus::Running),
        ];
        let summary = ScanSummary::from_executions(&execs);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.running, 1);
        assert_eq!(summary.pending, 0);
    }

    #[tokio::test]
    async fn load_missing_scan() {
        let store = MemoryStatusStore::new();
        let id = ScanId::new();
        assert!(matches!(
            ScanReport::load(&store, id).await,
            Err(EngineError::ScanNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn wait_times_out_on_unsettled_scan() {
        let store = MemoryStatusStore::new();
        let scan = Scan::new_running("tester", Target::parse("example.org").unwrap());
        let execs = vec![ModuleExecution::new_pending(scan.id, "dns")];
        store.create_scan(&scan, &execs).await.unwrap();

        let err = wait_until_settled(
            &store,
            scan.id,
            Duration::from_millis(5),
            Duration::from_millis(30),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::WaitTimeout { .. }));

        store.claim_execution(execs[0].id).await.unwrap();
        store
            .finish_execution(execs[0].id, 1, ExecutionOutcome::Failed(json!({"error": "x"})))
            .await
            .unwrap();
        store.complete_scan_if_settled(scan.id).await.unwrap();

        let report = wait_until_settled(
            &store,
            scan.id,
            Duration::from_millis(5),
            Duration::from_millis(30),
        )
        .await
        .unwrap();
        assert_eq!(report.summary.outcome, ScanOutcome::Failed);
    }
}
