//! 엔진 에러 타입
//!
//! [`EngineError`]는 조정자, 실행기, 보고 기능에서 발생하는 운영 에러입니다.
//! 모듈 실행 실패는 여기에 포함되지 않습니다. 모듈 실패는 실행 행의
//! `error` 결과로 기록될 뿐 호출자에게 전파되지 않습니다.
//!
//! `From<EngineError> for CentinelaError` 구현으로 상위 에러로 전파됩니다.

use std::time::Duration;

use centinela_core::error::{CentinelaError, QueueError, StoreError, SubmissionError};
use centinela_core::types::ScanId;

/// 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 제출 검증 실패 (아무 행도 생성되지 않음)
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// 상태 저장소 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 작업 큐 에러
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// 행 저장 후 작업 제출 실패
    #[error("scan {scan_id} persisted but dispatch failed after {submitted} task(s): {source}")]
    Dispatch {
        scan_id: ScanId,
        submitted: usize,
        #[source]
        source: QueueError,
    },

    /// 스캔을 찾을 수 없음
    #[error("scan not found: {0}")]
    ScanNotFound(ScanId),

    /// 대기 시간 초과
    #[error("scan {scan_id} did not settle within {waited:?}")]
    WaitTimeout { scan_id: ScanId, waited: Duration },
}

impl From<EngineError> for CentinelaError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Submission(e) => CentinelaError::Submission(e),
            EngineError::Store(e) => CentinelaError::Store(e),
            EngineError::Queue(e) => CentinelaError::Queue(e),
            EngineError::Dispatch {
                scan_id, source, ..
            } => CentinelaError::Dispatch { scan_id, source },
            EngineError::ScanNotFound(id) => {
                CentinelaError::Store(StoreError::Query(format!("scan not found: {id}")))
            }
            EngineError::WaitTimeout { scan_id, waited } => CentinelaError::Io(
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("scan {scan_id} did not settle within {waited:?}"),
                ),
            ),
        }
    }
}
