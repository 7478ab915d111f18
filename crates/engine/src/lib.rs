#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`coordinator`]: 스캔 제출 검증, 행 생성, 레인별 작업 분배
//! - [`runner`]: 전달 하나를 처리하는 모듈 실행기 (선점, 실행, 정산)
//! - [`worker`]: 레인별 워커 풀
//! - [`backend`]: 설정에 따른 저장소/큐 조합
//! - [`store`]: 상태 저장소 백엔드 (memory, sqlite)
//! - [`queue`]: 작업 큐 백엔드 (memory, sqlite)
//! - [`recovery`]: 고아 실행 복구와 스캔 재정산
//! - [`report`]: 스캔 보고서와 결과 요약
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! submit_scan -> StatusStore (scan + pending executions)
//!             -> TaskQueue [default | heavy]
//!                   -> WorkerPool -> ModuleRunner -> module.execute(target)
//!                                        |
//!                                  finish_execution + complete_scan_if_settled
//! ```

pub mod backend;
pub mod coordinator;
pub mod error;
pub mod queue;
pub mod recovery;
pub mod report;
pub mod runner;
pub mod store;
pub mod worker;

// --- 주요 타입 re-export ---

// 조정자 / 실행기
pub use coordinator::{ScanCoordinator, ScanRequest};
pub use runner::{ModuleRunner, RunOutcome};
pub use worker::WorkerPool;

// 백엔드
pub use backend::Backends;
pub use queue::{MemoryTaskQueue, SqliteTaskQueue};
pub use store::{MemoryStatusStore, SqliteStatusStore};

// 복구 / 보고
pub use recovery::{reconcile_running, recover_orphans};
pub use report::{ScanOutcome, ScanReport, ScanSummary, wait_until_settled};

// 에러
pub use error::EngineError;
