//! 에러 타입 — 도메인별 에러 정의
//!
//! [`CentinelaError`]는 모든 크레이트가 공유하는 최상위 에러입니다.
//! [`ModuleError`]는 정찰 모듈 경계에서만 사용되며,
//! 실행기(runner)가 결과 문서로 변환하므로 바깥으로 전파되지 않습니다.

use crate::types::ScanId;

/// Centinela 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum CentinelaError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스캔 제출 거부
    #[error("submission rejected: {0}")]
    Submission(#[from] SubmissionError),

    /// 상태 저장소 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 작업 큐 에러
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// 레지스트리 구성 에러
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// 행은 저장되었으나 작업 제출이 중간에 실패함
    #[error("scan {scan_id} persisted but dispatch failed: {source}")]
    Dispatch {
        scan_id: ScanId,
        #[source]
        source: QueueError,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스캔 제출 시점 검증 에러
///
/// 이 에러가 반환되면 저장소에는 어떤 행도 생성되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    /// 선택된 모듈이 없음
    #[error("no modules selected")]
    NoModules,

    /// 같은 모듈이 두 번 이상 선택됨
    #[error("module '{name}' selected more than once")]
    DuplicateModule { name: String },

    /// 레지스트리에 없는 모듈
    #[error("unknown module: {name}")]
    UnknownModule { name: String },

    /// 도메인도 IP도 아닌 대상
    #[error("invalid target '{target}': expected a domain name or an IP address")]
    InvalidTarget { target: String },

    /// 요청자 식별자가 비어 있음
    #[error("owner must not be empty")]
    MissingOwner,
}

impl SubmissionError {
    /// 거부 사유 분류 (메트릭 레이블)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoModules => "no_modules",
            Self::DuplicateModule { .. } => "duplicate_module",
            Self::UnknownModule { .. } => "unknown_module",
            Self::InvalidTarget { .. } => "invalid_target",
            Self::MissingOwner => "missing_owner",
        }
    }
}

/// 모듈 레지스트리 구성 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// 같은 이름의 모듈이 이미 등록됨
    #[error("module already registered: {name}")]
    AlreadyRegistered { name: String },

    /// 모듈 이름이 비어 있음
    #[error("module name must not be empty")]
    EmptyName,
}

/// 상태 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 저장된 값을 도메인 타입으로 복원할 수 없음
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// 같은 ID의 행이 이미 존재함
    #[error("duplicate id: {0}")]
    Duplicate(String),

    /// 내부 잠금이 오염됨
    #[error("store lock poisoned")]
    Poisoned,
}

/// 작업 큐 에러
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// 큐가 닫혀 더 이상 작업을 받을 수 없음
    #[error("queue closed")]
    Closed,

    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 작업 직렬화/역직렬화 실패
    #[error("malformed task: {0}")]
    Malformed(String),
}

/// 정찰 모듈 실행 에러
///
/// 실행기는 이 에러를 `{"error": ..., "kind": ...}` 문서로 변환해
/// 실행 행에 저장합니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    /// 네트워크 요청 실패
    #[error("network error: {0}")]
    Network(String),

    /// 응답/출력 파싱 실패
    #[error("parse error: {0}")]
    Parse(String),

    /// 모듈 자체 타임아웃
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// 이 모듈이 지원하지 않는 대상 종류
    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    /// 모듈 설정 누락 또는 외부 도구 없음
    #[error("module unavailable: {0}")]
    Unavailable(String),

    /// 외부 프로세스 실패
    #[error("process failed: {0}")]
    Process(String),
}

impl ModuleError {
    /// 결과 문서의 `kind` 필드에 기록되는 분류 문자열
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Parse(_) => "parse",
            Self::Timeout { .. } => "timeout",
            Self::UnsupportedTarget(_) => "unsupported_target",
            Self::Unavailable(_) => "unavailable",
            Self::Process(_) => "process",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_error_converts_into_top_level() {
        let err: CentinelaError = SubmissionError::UnknownModule {
            name: "sqlmap".to_owned(),
        }
        .into();
        assert!(matches!(err, CentinelaError::Submission(_)));
        assert_eq!(err.to_string(), "submission rejected: unknown module: sqlmap");
    }

    #[test]
    fn store_error_display() {
        let err: CentinelaError = StoreError::Query("disk full".to_owned()).into();
        assert_eq!(err.to_string(), "store error: query failed: disk full");
    }

    #[test]
    fn module_error_kinds_are_distinct() {
        let errors = [
            ModuleError::Network(String::new()),
            ModuleError::Parse(String::new()),
            ModuleError::Timeout { secs: 1 },
            ModuleError::UnsupportedTarget(String::new()),
            ModuleError::Unavailable(String::new()),
            ModuleError::Process(String::new()),
        ];
        let mut kinds: Vec<_> = errors.iter().map(ModuleError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn dispatch_error_carries_scan_id() {
        let scan_id = ScanId::new();
        let err = CentinelaError::Dispatch {
            scan_id,
            source: QueueError::Closed,
        };
        assert!(err.to_string().contains(&scan_id.to_string()));
    }
}
