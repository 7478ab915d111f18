//! 설정에 따른 저장소/큐 백엔드 조합
//!
//! | store  | queue  | 비고 |
//! |--------|--------|------|
//! | memory | memory | 단일 프로세스, 재시작 시 상태 유실 |
//! | sqlite | memory | 상태는 영속, 작업은 시작 시 고아 복구로 재구성 |
//! | sqlite | sqlite | 같은 DB 파일을 쓰는 여러 프로세스가 작업을 공유 |
//!
//! sqlite 큐는 sqlite 저장소의 연결 풀을 함께 사용합니다.

use std::sync::Arc;

use tracing::info;

use centinela_core::config::CentinelaConfig;

use crate::error::EngineError;
use crate::queue::{MemoryTaskQueue, SqliteTaskQueue};
use crate::store::{MemoryStatusStore, SqliteStatusStore, sqlite};

/// 열린 백엔드 조합
#[derive(Clone)]
pub enum Backends {
    Memory {
        store: Arc<MemoryStatusStore>,
        queue: Arc<MemoryTaskQueue>,
    },
    SqliteStore {
        store: Arc<SqliteStatusStore>,
        queue: Arc<MemoryTaskQueue>,
    },
    Sqlite {
        store: Arc<SqliteStatusStore>,
        queue: Arc<SqliteTaskQueue>,
    },
}

impl Backends {
    /// `[store]`, `[queue]` 설정대로 백엔드를 엽니다.
    ///
    /// 설정은 [`CentinelaConfig::validate`]를 통과했다고 가정합니다.
    pub async fn open(config: &CentinelaConfig) -> Result<Self, EngineError> {
        let backends = match (config.store.backend.as_str(), config.queue.backend.as_str()) {
            ("sqlite", queue_backend) => {
                let pool = sqlite::connect(&config.store.url, config.store.max_connections).await?;
                let store = Arc::new(SqliteStatusStore::new(pool.clone()).await?);
                if queue_backend == "sqlite" {
                    let queue = SqliteTaskQueue::new(
                        pool,
                        config.queue.lease(),
                        config.queue.poll_interval(),
                    )
                    .await?;
                    Self::Sqlite {
                        store,
                        queue: Arc::new(queue),
                    }
                } else {
                    Self::SqliteStore {
                        store,
                        queue: Arc::new(MemoryTaskQueue::new()),
                    }
                }
            }
            _ => Self::Memory {
                store: Arc::new(MemoryStatusStore::new()),
                queue: Arc::new(MemoryTaskQueue::new()),
            },
        };
        info!(backends = backends.describe(), "backends opened");
        Ok(backends)
    }

    /// `store/queue` 형식의 이름
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Memory { .. } => "memory/memory",
            Self::SqliteStore { .. } => "sqlite/memory",
            Self::Sqlite { .. } => "sqlite/sqlite",
        }
    }

    /// 작업이 프로세스 밖에서도 보이는지 (다른 프로세스가 소비 가능한지)
    pub fn queue_is_shared(&self) -> bool {
        matches!(self, Self::Sqlite { .. })
    }

    /// 큐를 닫아 대기 중인 소비자를 깨웁니다.
    pub fn close_queue(&self) {
        match self {
            Self::Memory { queue, .. } | Self::SqliteStore { queue, .. } => queue.close(),
            Self::Sqlite { queue, .. } => queue.close(),
        }
    }
}
