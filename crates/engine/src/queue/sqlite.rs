//! sqlite 작업 큐 (임대 기반, at-least-once)
//!
//! 작업은 `module_tasks` 테이블의 행입니다. `receive`는 레인에서 가장 오래된
//! 가용 작업 하나를 단일 `UPDATE ... RETURNING`으로 임대(lease)하고
//! `available_at`을 임대 만료 시각으로 옮깁니다. `ack`는 행을 삭제합니다.
//! ack 없이 임대가 만료되면 작업은 다시 가용 상태가 되어 재전달됩니다.

use std::time::Duration;

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use centinela_core::error::QueueError;
use centinela_core::queue::{Delivery, Lane, ModuleTask, TaskConsumer, TaskQueue};

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS module_tasks (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        lane         TEXT NOT NULL,
        execution_id TEXT NOT NULL,
        payload      TEXT NOT NULL,
        attempts     INTEGER NOT NULL DEFAULT 0,
        available_at INTEGER NOT NULL,
        created_at   INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_module_tasks_lane_available ON module_tasks (lane, available_at)",
];

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// sqlite [`TaskQueue`] + [`TaskConsumer`] 구현
#[derive(Debug, Clone)]
pub struct SqliteTaskQueue {
    pool: SqlitePool,
    lease: Duration,
    poll_interval: Duration,
    closed: CancellationToken,
}

impl SqliteTaskQueue {
    /// 풀을 감싸고 큐 테이블을 준비합니다.
    pub async fn new(
        pool: SqlitePool,
        lease: Duration,
        poll_interval: Duration,
    ) -> Result<Self, QueueError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| QueueError::Query(format!("queue schema setup failed: {e}")))?;
        }
        Ok(Self {
            pool,
            lease,
            poll_interval,
            closed: CancellationToken::new(),
        })
    }

    /// 큐를 닫습니다. 폴링 중인 `receive`는 `None`을 반환합니다.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// 레인에 남아 있는 작업 수 (임대 중 포함)
    pub async fn depth(&self, lane: Lane) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM module_tasks WHERE lane = ?")
            .bind(lane.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::Query(format!("queue depth failed: {e}")))?;
        Ok(count.max(0) as u64)
    }

    async fn try_lease(&self, lane: Lane) -> Result<Option<Delivery>, QueueError> {
        let now = now_millis();
        let row = sqlx::query(
            "UPDATE module_tasks
             SET attempts = attempts + 1, available_at = ?
             WHERE id = (
                 SELECT id FROM module_tasks
                 WHERE lane = ? AND available_at <= ?
                 ORDER BY available_at, id
                 LIMIT 1
             )
             RETURNING id, attempts, payload",
        )
        .bind(now.saturating_add(millis(self.lease)))
        .bind(lane.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Query(format!("lease task failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row
            .try_get("id")
            .map_err(|e| QueueError::Malformed(format!("task id: {e}")))?;
        let attempts: i64 = row
            .try_get("attempts")
            .map_err(|e| QueueError::Malformed(format!("task attempts: {e}")))?;
        let payload: String = row
            .try_get("payload")
            .map_err(|e| QueueError::Malformed(format!("task payload: {e}")))?;
        let task: ModuleTask = serde_json::from_str(&payload)
            .map_err(|e| QueueError::Malformed(format!("task {id} payload: {e}")))?;

        Ok(Some(Delivery {
            delivery_id: id as u64,
            attempt: u32::try_from(attempts).unwrap_or(u32::MAX),
            task,
        }))
    }
}

impl TaskQueue for SqliteTaskQueue {
    async fn submit(&self, task: ModuleTask) -> Result<(), QueueError> {
        if self.closed.is_cancelled() {
            return Err(QueueError::Closed);
        }
        let payload = serde_json::to_string(&task)
            .map_err(|e| QueueError::Malformed(format!("task encode failed: {e}")))?;
        let now = now_millis();
        sqlx::query(
            "INSERT INTO module_tasks (lane, execution_id, payload, attempts, available_at, created_at)
             VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(task.lane.as_str())
        .bind(task.execution_id.to_string())
        .bind(payload)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Query(format!("enqueue failed: {e}")))?;
        Ok(())
    }
}

impl TaskConsumer for SqliteTaskQueue {
    async fn receive(&self, lane: Lane) -> Result<Option<Delivery>, QueueError> {
        loop {
            if self.closed.is_cancelled() {
                return Ok(None);
            }
            if let Some(delivery) = self.try_lease(lane).await? {
                if delivery.is_redelivery() {
                    debug!(
                        lane = %lane,
                        execution_id = %delivery.task.execution_id,
                        attempt = delivery.attempt,
                        "redelivering task"
                    );
                }
                return Ok(Some(delivery));
            }
            tokio::select! {
                _ = self.closed.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let deleted = sqlx::query("DELETE FROM module_tasks WHERE id = ? AND attempts = ?")
            .bind(delivery.delivery_id as i64)
            .bind(i64::from(delivery.attempt))
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Query(format!("ack failed: {e}")))?;
        if deleted.rows_affected() == 0 {
            // 임대가 만료되어 다른 워커가 다시 가져간 경우
            warn!(
                delivery_id = delivery.delivery_id,
                attempt = delivery.attempt,
                "ack ignored: lease no longer held"
            );
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError> {
        sqlx::query("UPDATE module_tasks SET available_at = ? WHERE id = ? AND attempts = ?")
            .bind(now_millis().saturating_add(millis(delay)))
            .bind(delivery.delivery_id as i64)
            .bind(i64::from(delivery.attempt))
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Query(format!("nack failed: {e}")))?;
        Ok(())
    }
}
