//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 구성 요소는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `centinela_`
//! - 구성 요소: `scans_`, `executions_`, `queue_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use centinela_core::metrics as m;
//!
//! metrics::counter!(m::EXECUTIONS_FINISHED_TOTAL, m::LABEL_MODULE => "dns").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 모듈 레이블 키
pub const LABEL_MODULE: &str = "module";

/// 레인 레이블 키 (default, heavy)
pub const LABEL_LANE: &str = "lane";

/// 결과 레이블 키 (completed, error)
pub const LABEL_RESULT: &str = "result";

/// 에러 분류 레이블 키 (network, timeout, panic, ...)
pub const LABEL_KIND: &str = "kind";

// ─── 스캔 메트릭 ───────────────────────────────────────────────────

/// 제출된 스캔 수 (counter)
pub const SCANS_SUBMITTED_TOTAL: &str = "centinela_scans_submitted_total";

/// 제출 시점에 거부된 스캔 수 (counter, label: kind)
pub const SCANS_REJECTED_TOTAL: &str = "centinela_scans_rejected_total";

/// completed로 전이된 스캔 수 (counter)
pub const SCANS_COMPLETED_TOTAL: &str = "centinela_scans_completed_total";

// ─── 모듈 실행 메트릭 ──────────────────────────────────────────────

/// 종료된 모듈 실행 수 (counter, labels: module, result)
pub const EXECUTIONS_FINISHED_TOTAL: &str = "centinela_executions_finished_total";

/// 모듈 실행 에러 수 (counter, labels: module, kind)
pub const EXECUTIONS_ERRORS_TOTAL: &str = "centinela_executions_errors_total";

/// 이미 종료된 실행에 대한 재전달 수 (counter, label: module)
pub const EXECUTIONS_REDELIVERED_TOTAL: &str = "centinela_executions_redelivered_total";

/// 만료된 선점을 인수하거나 중단된 선점을 재개한 수 (counter, labels: module, result)
pub const EXECUTIONS_RESUMED_TOTAL: &str = "centinela_executions_resumed_total";

/// 모듈 실행 소요 시간 (histogram, 초, label: module)
pub const EXECUTION_DURATION_SECONDS: &str = "centinela_execution_duration_seconds";

/// 실행 중인 모듈 수 (gauge, label: lane)
pub const EXECUTIONS_IN_FLIGHT: &str = "centinela_executions_in_flight";

// ─── 큐 메트릭 ─────────────────────────────────────────────────────

/// 제출된 작업 수 (counter, label: lane)
pub const QUEUE_TASKS_SUBMITTED_TOTAL: &str = "centinela_queue_tasks_submitted_total";

/// 저장소 에러나 다른 실행기의 선점 때문에 ack되지 않은 작업 수 (counter, label: lane)
pub const QUEUE_TASKS_NACKED_TOTAL: &str = "centinela_queue_tasks_nacked_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "centinela_daemon_uptime_seconds";

/// Daemon: 등록된 모듈 수 (gauge)
pub const DAEMON_MODULES_REGISTERED: &str = "centinela_daemon_modules_registered";

/// Daemon: 재정산으로 복구된 스캔 수 (counter)
pub const DAEMON_SCANS_RECONCILED_TOTAL: &str = "centinela_daemon_scans_reconciled_total";

/// Daemon: 시작 시 재제출된 고아 실행 수 (counter, pending과 running 모두)
pub const DAEMON_ORPHANS_RECOVERED_TOTAL: &str = "centinela_daemon_orphans_recovered_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 모듈 실행 시간 히스토그램 버킷 (초)
///
/// 100ms ~ 15m 범위 (nmap 서비스 탐지 포함)
pub const EXECUTION_DURATION_BUCKETS: [f64; 10] =
    [0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(SCANS_SUBMITTED_TOTAL, "Total number of scans accepted");
    describe_counter!(
        SCANS_REJECTED_TOTAL,
        "Total number of scan submissions rejected before persistence"
    );
    describe_counter!(
        SCANS_COMPLETED_TOTAL,
        "Total number of scans transitioned to completed"
    );

    describe_counter!(
        EXECUTIONS_FINISHED_TOTAL,
        "Total number of module executions that reached a terminal state"
    );
    describe_counter!(
        EXECUTIONS_ERRORS_TOTAL,
        "Total number of module executions recorded as error, by kind"
    );
    describe_counter!(
        EXECUTIONS_REDELIVERED_TOTAL,
        "Deliveries observed for executions that were already terminal"
    );
    describe_counter!(
        EXECUTIONS_RESUMED_TOTAL,
        "Running executions resumed by their owner or taken over after the claim expired"
    );
    describe_histogram!(
        EXECUTION_DURATION_SECONDS,
        "Wall-clock time of a single module execution in seconds"
    );
    describe_gauge!(
        EXECUTIONS_IN_FLIGHT,
        "Number of module executions currently running per lane"
    );

    describe_counter!(
        QUEUE_TASKS_SUBMITTED_TOTAL,
        "Total number of tasks submitted per lane"
    );
    describe_counter!(
        QUEUE_TASKS_NACKED_TOTAL,
        "Tasks deferred after a persistence failure or while another claim was live"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Centinela daemon uptime in seconds");
    describe_gauge!(
        DAEMON_MODULES_REGISTERED,
        "Number of scan modules registered in the daemon"
    );
    describe_counter!(
        DAEMON_SCANS_RECONCILED_TOTAL,
        "Scans completed by the periodic reconciler"
    );
    describe_counter!(
        DAEMON_ORPHANS_RECOVERED_TOTAL,
        "Pending or running executions resubmitted at startup"
    );
}
