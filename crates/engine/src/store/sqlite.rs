//! sqlite 상태 저장소
//!
//! 선점(claim), 종료 기록(finish), 정산(settle)은 모두 단일 조건부 `UPDATE`이고,
//! 스캔 생성은 하나의 트랜잭션입니다. 여러 프로세스(CLI 제출 + 데몬 워커)가
//! 같은 DB 파일을 공유할 수 있습니다.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use tracing::debug;

use centinela_core::error::StoreError;
use centinela_core::store::{ClaimOutcome, ExecutionOutcome, Settlement, StatusStore};
use centinela_core::types::{
    ExecutionId, ExecutionStatus, ModuleExecution, Scan, ScanId, ScanStatus, Target, TargetKind,
};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS scans (
        id          TEXT PRIMARY KEY,
        owner       TEXT NOT NULL,
        target      TEXT NOT NULL,
        target_kind TEXT NOT NULL,
        status      TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS module_executions (
        id          TEXT PRIMARY KEY,
        scan_id     TEXT NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
        seq         INTEGER NOT NULL,
        module      TEXT NOT NULL,
        status      TEXT NOT NULL,
        result      TEXT NOT NULL DEFAULT '{}',
        executed_at TEXT NOT NULL,
        finished_at TEXT,
        attempt     INTEGER NOT NULL DEFAULT 0,
        claimed_at  TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_executions_scan_status ON module_executions (scan_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_scans_status ON scans (status, created_at)",
];

const EXECUTION_COLUMNS: &str =
    "id, scan_id, module, status, result, executed_at, finished_at, attempt, claimed_at";

/// 선점 컬럼이 생기기 전에 만들어진 DB에 추가할 컬럼
const CLAIM_COLUMNS: [(&str, &str); 2] = [
    ("attempt", "ALTER TABLE module_executions ADD COLUMN attempt INTEGER NOT NULL DEFAULT 0"),
    ("claimed_at", "ALTER TABLE module_executions ADD COLUMN claimed_at TEXT"),
];

/// sqlite 연결 풀을 엽니다.
///
/// DB 파일이 없으면 생성하고, WAL 모드와 외래 키 제약을 켭니다.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| StoreError::Connection(format!("invalid sqlite url '{url}': {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::Connection(format!("failed to open {url}: {e}")))
}

/// sqlite [`StatusStore`] 구현
#[derive(Debug, Clone)]
pub struct SqliteStatusStore {
    pool: SqlitePool,
}

impl SqliteStatusStore {
    /// 풀을 감싸고 스키마를 준비합니다.
    pub async fn new(pool: SqlitePool) -> Result<Self, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| StoreError::Query(format!("schema setup failed: {e}")))?;
        }
        for (column, statement) in CLAIM_COLUMNS {
            let present: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM pragma_table_info('module_executions') WHERE name = ?",
            )
            .bind(column)
            .fetch_one(&pool)
            .await
            .map_err(|e| StoreError::Query(format!("schema inspection failed: {e}")))?;
            if present == 0 {
                sqlx::query(statement)
                    .execute(&pool)
                    .await
                    .map_err(|e| StoreError::Query(format!("adding column {column} failed: {e}")))?;
                debug!(column, "added claim column to module_executions");
            }
        }
        debug!("sqlite status store schema ready");
        Ok(Self { pool })
    }

    /// 내부 풀 (큐 백엔드와 공유할 때 사용)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

}

fn query_err(context: &str) -> impl Fn(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Query(format!("{context}: {e}"))
}

fn text(row: &SqliteRow, column: &str) -> Result<String, StoreError> {
    row.try_get::<String, _>(column)
        .map_err(|e| StoreError::Corrupt(format!("column '{column}': {e}")))
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = text(row, column)?;
    raw.parse::<T>()
        .map_err(|e| StoreError::Corrupt(format!("column '{column}' value '{raw}': {e}")))
}

fn timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    row.try_get::<DateTime<Utc>, _>(column)
        .map_err(|e| StoreError::Corrupt(format!("column '{column}': {e}")))
}

fn optional_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    row.try_get::<Option<DateTime<Utc>>, _>(column)
        .map_err(|e| StoreError::Corrupt(format!("column '{column}': {e}")))
}

fn scan_from_row(row: &SqliteRow) -> Result<Scan, StoreError> {
    Ok(Scan {
        id: parse_column(row, "id")?,
        owner: text(row, "owner")?,
        target: Target::from_parts(
            text(row, "target")?,
            parse_column::<TargetKind>(row, "target_kind")?,
        ),
        status: parse_column(row, "status")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn execution_from_row(row: &SqliteRow) -> Result<ModuleExecution, StoreError> {
    let raw_result = text(row, "result")?;
    let result = serde_json::from_str(&raw_result)
        .map_err(|e| StoreError::Corrupt(format!("result document: {e}")))?;
    let finished_at = optional_timestamp(row, "finished_at")?;
    let attempt: i64 = row
        .try_get("attempt")
        .map_err(|e| StoreError::Corrupt(format!("column 'attempt': {e}")))?;

    Ok(ModuleExecution {
        id: parse_column(row, "id")?,
        scan_id: parse_column(row, "scan_id")?,
        module: text(row, "module")?,
        status: parse_column(row, "status")?,
        result,
        executed_at: timestamp(row, "executed_at")?,
        finished_at,
        attempt: u32::try_from(attempt).map_err(|e| {
            StoreError::Corrupt(format!("column 'attempt' value {attempt}: {e}"))
        })?,
        claimed_at: optional_timestamp(row, "claimed_at")?,
    })
}

impl StatusStore for SqliteStatusStore {
    async fn create_scan(
        &self,
        scan: &Scan,
        executions: &[ModuleExecution],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_err("begin create_scan tx failed"))?;

        sqlx::query(
            "INSERT INTO scans (id, owner, target, target_kind, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(scan.id.to_string())
        .bind(&scan.owner)
        .bind(scan.target.value())
        .bind(scan.target.kind().as_str())
        .bind(scan.status.as_str())
        .bind(scan.created_at)
        .bind(scan.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(scan.id.to_string())
            }
            _ => StoreError::Query(format!("insert scan failed: {e}")),
        })?;

        for (seq, exec) in executions.iter().enumerate() {
            let result = serde_json::to_string(&exec.result)
                .map_err(|e| StoreError::Query(format!("result encode failed: {e}")))?;
            sqlx::query(
                "INSERT INTO module_executions
                    (id, scan_id, seq, module, status, result, executed_at, finished_at,
                     attempt, claimed_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(exec.id.to_string())
            .bind(exec.scan_id.to_string())
            .bind(seq as i64)
            .bind(&exec.module)
            .bind(exec.status.as_str())
            .bind(result)
            .bind(exec.executed_at)
            .bind(exec.finished_at)
            .bind(i64::from(exec.attempt))
            .bind(exec.claimed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::Duplicate(exec.id.to_string())
                }
                _ => StoreError::Query(format!("insert execution failed: {e}")),
            })?;
        }

        tx.commit()
            .await
            .map_err(query_err("commit create_scan tx failed"))
    }

    async fn get_scan(&self, id: ScanId) -> Result<Option<Scan>, StoreError> {
        sqlx::query("SELECT * FROM scans WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err("get scan failed"))?
            .map(|row| scan_from_row(&row))
            .transpose()
    }

    async fn list_scans(&self, status: Option<ScanStatus>) -> Result<Vec<Scan>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM scans WHERE status = ? ORDER BY created_at")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM scans ORDER BY created_at")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(query_err("list scans failed"))?;
        rows.iter().map(scan_from_row).collect()
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<ModuleExecution>, StoreError> {
        sqlx::query(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM module_executions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err("get execution failed"))?
        .map(|row| execution_from_row(&row))
        .transpose()
    }

    async fn list_executions(&self, scan_id: ScanId) -> Result<Vec<ModuleExecution>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM module_executions WHERE scan_id = ? ORDER BY seq"
        ))
        .bind(scan_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("list executions failed"))?;
        rows.iter().map(execution_from_row).collect()
    }

    async fn pending_executions(&self) -> Result<Vec<ModuleExecution>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM module_executions
             WHERE status = 'pending' ORDER BY executed_at, seq"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("list pending executions failed"))?;
        rows.iter().map(execution_from_row).collect()
    }

    async fn running_executions(&self) -> Result<Vec<ModuleExecution>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM module_executions
             WHERE status = 'running' ORDER BY claimed_at, seq"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("list running executions failed"))?;
        rows.iter().map(execution_from_row).collect()
    }

    async fn claim_execution(&self, id: ExecutionId) -> Result<ClaimOutcome, StoreError> {
        let claimed = sqlx::query(&format!(
            "UPDATE module_executions
             SET status = 'running', attempt = attempt + 1, claimed_at = ?
             WHERE id = ? AND status = 'pending'
             RETURNING {EXECUTION_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err("claim execution failed"))?;

        if let Some(row) = claimed {
            return Ok(ClaimOutcome::Claimed(execution_from_row(&row)?));
        }

        let Some(current) = self.get_execution(id).await? else {
            return Ok(ClaimOutcome::Missing);
        };
        Ok(match current.status {
            // 두 문장 사이에 다른 실행기가 선점한 경우도 포함
            ExecutionStatus::Pending | ExecutionStatus::Running => {
                ClaimOutcome::AlreadyRunning(current)
            }
            status => ClaimOutcome::AlreadyFinished(status),
        })
    }

    async fn reclaim_execution(
        &self,
        id: ExecutionId,
        expected_attempt: u32,
    ) -> Result<Option<ModuleExecution>, StoreError> {
        sqlx::query(&format!(
            "UPDATE module_executions
             SET attempt = attempt + 1, claimed_at = ?
             WHERE id = ? AND status = 'running' AND attempt = ?
             RETURNING {EXECUTION_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(i64::from(expected_attempt))
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err("reclaim execution failed"))?
        .map(|row| execution_from_row(&row))
        .transpose()
    }

    async fn finish_execution(
        &self,
        id: ExecutionId,
        attempt: u32,
        outcome: ExecutionOutcome,
    ) -> Result<bool, StoreError> {
        let result = serde_json::to_string(outcome.document())
            .map_err(|e| StoreError::Query(format!("result encode failed: {e}")))?;
        let updated = sqlx::query(
            "UPDATE module_executions SET status = ?, result = ?, finished_at = ?
             WHERE id = ? AND status = 'running' AND attempt = ?",
        )
        .bind(outcome.status().as_str())
        .bind(result)
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(i64::from(attempt))
        .execute(&self.pool)
        .await
        .map_err(query_err("finish execution failed"))?;
        Ok(updated.rows_affected() == 1)
    }

    async fn complete_scan_if_settled(&self, scan_id: ScanId) -> Result<Settlement, StoreError> {
        let id = scan_id.to_string();
        // 조건 확인과 전이가 한 문장이므로 형제 실행 간 경쟁에서도 전이가 유실되지 않음
        for _ in 0..2 {
            let updated = sqlx::query(
                "UPDATE scans SET status = 'completed', updated_at = ?
                 WHERE id = ?
                   AND status IN ('pending', 'running')
                   AND NOT EXISTS (
                       SELECT 1 FROM module_executions
                       WHERE scan_id = ? AND status IN ('pending', 'running')
                   )",
            )
            .bind(Utc::now())
            .bind(&id)
            .bind(&id)
            .execute(&self.pool)
            .await
            .map_err(query_err("settle scan failed"))?;

            if updated.rows_affected() == 1 {
                return Ok(Settlement::Completed);
            }

            let Some(row) = sqlx::query("SELECT status FROM scans WHERE id = ?")
                .bind(&id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_err("scan status lookup failed"))?
            else {
                return Ok(Settlement::Missing);
            };
            if parse_column::<ScanStatus>(&row, "status")?.is_terminal() {
                return Ok(Settlement::AlreadyTerminal);
            }

            let outstanding: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM module_executions
                 WHERE scan_id = ? AND status IN ('pending', 'running')",
            )
            .bind(&id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_err("outstanding count failed"))?;

            if outstanding > 0 {
                return Ok(Settlement::Outstanding(outstanding as usize));
            }
            // 마지막 형제가 UPDATE와 COUNT 사이에 끝남: 다시 시도
        }
        Ok(Settlement::Outstanding(0))
    }
}
