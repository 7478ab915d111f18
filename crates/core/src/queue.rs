//! 작업 큐 trait — 두 개의 레인(default, heavy)을 가진 스케줄링 백엔드
//!
//! 작업 하나는 실행 ID 하나를 나릅니다. 백엔드는 최소 한 번(at-least-once)
//! 전달을 보장하면 되며, 중복 전달은 실행기가 상태 저장소의
//! 조건부 전이로 흡수합니다.
//!
//! 제출 측은 [`TaskQueue`], 소비 측은 [`TaskConsumer`]를 사용합니다.
//! 소비 측이 `ack`하지 않고 `nack`한 전달은 지연 후 다시 전달됩니다.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::module::ResourceClass;
use crate::types::{ExecutionId, ScanId};

/// 작업 레인
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Default,
    Heavy,
}

impl Lane {
    /// 모든 레인
    pub const ALL: [Lane; 2] = [Lane::Default, Lane::Heavy];

    /// 자원 등급에 맞는 레인을 선택합니다.
    pub fn for_class(class: ResourceClass) -> Self {
        match class {
            ResourceClass::Heavy => Self::Heavy,
            ResourceClass::Standard => Self::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Heavy => "heavy",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lane {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "heavy" => Ok(Self::Heavy),
            other => Err(QueueError::Malformed(format!("unknown lane: {other}"))),
        }
    }
}

/// `execute_module` 작업
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleTask {
    /// 실행할 실행 행 ID
    pub execution_id: ExecutionId,
    /// 소속 스캔 ID (로깅용)
    pub scan_id: ScanId,
    /// 모듈 이름 (로깅용)
    pub module: String,
    /// 제출된 레인
    pub lane: Lane,
}

/// 전달된 작업
///
/// `ack`하지 않은 전달은 백엔드가 재전달할 수 있습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// 백엔드 내부 전달 ID
    pub delivery_id: u64,
    /// 전달 횟수 (1부터 시작)
    pub attempt: u32,
    /// 작업 내용
    pub task: ModuleTask,
}

impl Delivery {
    /// 재전달 여부
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// 작업 제출 측
pub trait TaskQueue: Send + Sync + 'static {
    /// 작업을 해당 레인에 제출합니다.
    fn submit(&self, task: ModuleTask) -> impl Future<Output = Result<(), QueueError>> + Send;
}

/// 작업 소비 측
pub trait TaskConsumer: Send + Sync + 'static {
    /// 레인에서 다음 작업을 기다립니다.
    ///
    /// 큐가 닫혀 더 이상 작업이 없으면 `Ok(None)`을 반환합니다.
    fn receive(
        &self,
        lane: Lane,
    ) -> impl Future<Output = Result<Option<Delivery>, QueueError>> + Send;

    /// 처리가 끝난 전달을 확인(ack)합니다.
    fn ack(&self, delivery: &Delivery) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// 처리에 실패한 전달을 `delay` 이후 다시 전달되도록 돌려놓습니다.
    fn nack(
        &self,
        delivery: &Delivery,
        delay: Duration,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;
}
