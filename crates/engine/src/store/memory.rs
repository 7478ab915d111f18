//! 인메모리 상태 저장소
//!
//! 하나의 `Mutex`가 두 테이블을 함께 보호하므로 모든 연산이
//! 자연스럽게 원자적입니다. 단일 프로세스 실행(`centinela scan`)과 테스트에 사용합니다.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use centinela_core::error::StoreError;
use centinela_core::store::{ClaimOutcome, ExecutionOutcome, Settlement, StatusStore};
use centinela_core::types::{
    ExecutionId, ExecutionStatus, ModuleExecution, Scan, ScanId, ScanStatus,
};

#[derive(Default)]
struct Tables {
    scans: HashMap<ScanId, Scan>,
    executions: HashMap<ExecutionId, ModuleExecution>,
    /// 스캔별 실행 ID (생성 순서)
    by_scan: HashMap<ScanId, Vec<ExecutionId>>,
}

impl Tables {
    fn outstanding(&self, scan_id: ScanId) -> usize {
        self.by_scan
            .get(&scan_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.executions.get(id))
                    .filter(|e| !e.status.is_terminal())
                    .count()
            })
            .unwrap_or(0)
    }
}

/// 인메모리 [`StatusStore`] 구현
#[derive(Default)]
pub struct MemoryStatusStore {
    tables: Mutex<Tables>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl StatusStore for MemoryStatusStore {
    async fn create_scan(
        &self,
        scan: &Scan,
        executions: &[ModuleExecution],
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.scans.contains_key(&scan.id) {
            return Err(StoreError::Duplicate(scan.id.to_string()));
        }
        if let Some(dup) = executions
            .iter()
            .find(|e| tables.executions.contains_key(&e.id))
        {
            return Err(StoreError::Duplicate(dup.id.to_string()));
        }

        tables.scans.insert(scan.id, scan.clone());
        tables
            .by_scan
            .insert(scan.id, executions.iter().map(|e| e.id).collect());
        for exec in executions {
            tables.executions.insert(exec.id, exec.clone());
        }
        Ok(())
    }

    async fn get_scan(&self, id: ScanId) -> Result<Option<Scan>, StoreError> {
        Ok(self.lock()?.scans.get(&id).cloned())
    }

    async fn list_scans(&self, status: Option<ScanStatus>) -> Result<Vec<Scan>, StoreError> {
        let tables = self.lock()?;
        let mut scans: Vec<Scan> = tables
            .scans
            .values()
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .cloned()
            .collect();
        scans.sort_by_key(|s| s.created_at);
        Ok(scans)
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<ModuleExecution>, StoreError> {
        Ok(self.lock()?.executions.get(&id).cloned())
    }

    async fn list_executions(&self, scan_id: ScanId) -> Result<Vec<ModuleExecution>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .by_scan
            .get(&scan_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.executions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn pending_executions(&self) -> Result<Vec<ModuleExecution>, StoreError> {
        let tables = self.lock()?;
        let mut pending: Vec<ModuleExecution> = tables
            .executions
            .values()
            .filter(|e| e.status == ExecutionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.executed_at);
        Ok(pending)
    }

    async fn running_executions(&self) -> Result<Vec<ModuleExecution>, StoreError> {
        let tables = self.lock()?;
        let mut running: Vec<ModuleExecution> = tables
            .executions
            .values()
            .filter(|e| e.status == ExecutionStatus::Running)
            .cloned()
            .collect();
        running.sort_by_key(|e| e.claimed_at);
        Ok(running)
    }

    async fn claim_execution(&self, id: ExecutionId) -> Result<ClaimOutcome, StoreError> {
        let mut tables = self.lock()?;
        let Some(exec) = tables.executions.get_mut(&id) else {
            return Ok(ClaimOutcome::Missing);
        };
        Ok(match exec.status {
            ExecutionStatus::Pending => {
                exec.status = ExecutionStatus::Running;
                exec.attempt = exec.attempt.saturating_add(1);
                exec.claimed_at = Some(Utc::now());
                ClaimOutcome::Claimed(exec.clone())
            }
            ExecutionStatus::Running => ClaimOutcome::AlreadyRunning(exec.clone()),
            status => ClaimOutcome::AlreadyFinished(status),
        })
    }

    async fn reclaim_execution(
        &self,
        id: ExecutionId,
        expected_attempt: u32,
    ) -> Result<Option<ModuleExecution>, StoreError> {
        let mut tables = self.lock()?;
        let Some(exec) = tables.executions.get_mut(&id) else {
            return Ok(None);
        };
        if exec.status != ExecutionStatus::Running || exec.attempt != expected_attempt {
            return Ok(None);
        }
        exec.attempt = exec.attempt.saturating_add(1);
        exec.claimed_at = Some(Utc::now());
        Ok(Some(exec.clone()))
    }

    async fn finish_execution(
        &self,
        id: ExecutionId,
        attempt: u32,
        outcome: ExecutionOutcome,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let Some(exec) = tables.executions.get_mut(&id) else {
            return Ok(false);
        };
        if exec.status != ExecutionStatus::Running || exec.attempt != attempt {
            return Ok(false);
        }
        exec.status = outcome.status();
        exec.finished_at = Some(Utc::now());
        exec.result = match outcome {
            ExecutionOutcome::Completed(v) | ExecutionOutcome::Failed(v) => v,
        };
        Ok(true)
    }

    async fn complete_scan_if_settled(&self, scan_id: ScanId) -> Result<Settlement, StoreError> {
        let mut tables = self.lock()?;
        let outstanding = tables.outstanding(scan_id);
        let Some(scan) = tables.scans.get_mut(&scan_id) else {
            return Ok(Settlement::Missing);
        };
        if scan.status.is_terminal() {
            return Ok(Settlement::AlreadyTerminal);
        }
        if outstanding > 0 {
            return Ok(Settlement::Outstanding(outstanding));
        }
        scan.status = ScanStatus::Completed;
        scan.updated_at = Utc::now();
        Ok(Settlement::Completed)
    }
}
