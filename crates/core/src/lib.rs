//! # centinela-core
//!
//! 스캔 오케스트레이션 엔진의 공통 타입, trait, 에러, 설정.
//!
//! - [`types`]: 스캔/모듈 실행 엔티티와 상태 머신
//! - [`module`]: 정찰 모듈 계약과 불변 레지스트리
//! - [`store`]: 상태 저장소 trait
//! - [`queue`]: 두 레인 작업 큐 trait
//! - [`config`]: `centinela.toml` 설정
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod module;
pub mod queue;
pub mod store;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    CentinelaError, ConfigError, ModuleError, QueueError, RegistryError, StoreError,
    SubmissionError,
};

// 설정
pub use config::CentinelaConfig;

// 모듈 계약
pub use module::{
    BoxFuture, DynScanModule, ModuleInfo, ModuleRegistry, ModuleRegistryBuilder, ResourceClass,
    ScanModule,
};

// 저장소 / 큐 trait
pub use queue::{Delivery, Lane, ModuleTask, TaskConsumer, TaskQueue};
pub use store::{ClaimOutcome, ExecutionOutcome, Settlement, StatusStore};

// 도메인 타입
pub use types::{
    ExecutionId, ExecutionStatus, ModuleExecution, Scan, ScanId, ScanStatus, Target, TargetKind,
};
