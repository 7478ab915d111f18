//! 설정 관리 — centinela.toml 파싱 및 런타임 설정
//!
//! [`CentinelaConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CENTINELA_WORKER_HEAVY_CONCURRENCY=4` 형식)
//! 3. 설정 파일 (`centinela.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), centinela_core::error::CentinelaError> {
//! use centinela_core::config::CentinelaConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = CentinelaConfig::load("centinela.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = CentinelaConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CentinelaError, ConfigError};
use crate::queue::Lane;

/// 기본 제공 정찰 모듈 이름
pub const BUILTIN_MODULES: [&str; 6] = ["dns", "dorks", "headerhttp", "nmap", "ssl", "whois"];

/// Centinela 통합 설정
///
/// `centinela.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CentinelaConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 상태 저장소 설정
    #[serde(default)]
    pub store: StoreConfig,
    /// 작업 큐 설정
    #[serde(default)]
    pub queue: QueueConfig,
    /// 워커 풀 설정
    #[serde(default)]
    pub worker: WorkerConfig,
    /// 정찰 모듈 설정
    #[serde(default)]
    pub modules: ModulesConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl CentinelaConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CentinelaError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CentinelaError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CentinelaError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CentinelaError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, CentinelaError> {
        toml::from_str(toml_str).map_err(|e| {
            CentinelaError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `CENTINELA_{SECTION}_{FIELD}`
    /// 예: `CENTINELA_STORE_URL=sqlite:///tmp/centinela.db`
    ///
    /// dorks 자격 증명은 `API_KEY_SEARCH_GOOGLE`, `SEARCH_ENGINE_ID`도 인식합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "CENTINELA_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "CENTINELA_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "CENTINELA_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "CENTINELA_GENERAL_PID_FILE");

        // Store
        override_string(&mut self.store.backend, "CENTINELA_STORE_BACKEND");
        override_string(&mut self.store.url, "CENTINELA_STORE_URL");
        override_u32(
            &mut self.store.max_connections,
            "CENTINELA_STORE_MAX_CONNECTIONS",
        );

        // Queue
        override_string(&mut self.queue.backend, "CENTINELA_QUEUE_BACKEND");
        override_u64(&mut self.queue.lease_secs, "CENTINELA_QUEUE_LEASE_SECS");
        override_u64(
            &mut self.queue.poll_interval_ms,
            "CENTINELA_QUEUE_POLL_INTERVAL_MS",
        );

        // Worker
        override_usize(
            &mut self.worker.default_concurrency,
            "CENTINELA_WORKER_DEFAULT_CONCURRENCY",
        );
        override_usize(
            &mut self.worker.heavy_concurrency,
            "CENTINELA_WORKER_HEAVY_CONCURRENCY",
        );
        override_u64(
            &mut self.worker.default_timeout_secs,
            "CENTINELA_WORKER_DEFAULT_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.worker.heavy_timeout_secs,
            "CENTINELA_WORKER_HEAVY_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.worker.reconcile_interval_secs,
            "CENTINELA_WORKER_RECONCILE_INTERVAL_SECS",
        );
        override_u64(
            &mut self.worker.retry_delay_secs,
            "CENTINELA_WORKER_RETRY_DELAY_SECS",
        );
        override_u64(
            &mut self.worker.claim_grace_secs,
            "CENTINELA_WORKER_CLAIM_GRACE_SECS",
        );
        override_bool(
            &mut self.worker.recover_on_start,
            "CENTINELA_WORKER_RECOVER_ON_START",
        );

        // Modules
        override_csv(&mut self.modules.enabled, "CENTINELA_MODULES_ENABLED");
        override_string(&mut self.modules.nmap.binary, "CENTINELA_MODULES_NMAP_BINARY");
        override_string(&mut self.modules.nmap.ports, "CENTINELA_MODULES_NMAP_PORTS");
        override_string(&mut self.modules.whois.server, "CENTINELA_MODULES_WHOIS_SERVER");
        override_string(&mut self.modules.dorks.api_key, "API_KEY_SEARCH_GOOGLE");
        override_string(&mut self.modules.dorks.api_key, "CENTINELA_MODULES_DORKS_API_KEY");
        override_string(&mut self.modules.dorks.search_engine_id, "SEARCH_ENGINE_ID");
        override_string(
            &mut self.modules.dorks.search_engine_id,
            "CENTINELA_MODULES_DORKS_SEARCH_ENGINE_ID",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "CENTINELA_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "CENTINELA_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "CENTINELA_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CentinelaError> {
        one_of(
            "general.log_level",
            &self.general.log_level,
            &["trace", "debug", "info", "warn", "error"],
        )?;
        one_of(
            "general.log_format",
            &self.general.log_format,
            &["json", "pretty"],
        )?;
        one_of("store.backend", &self.store.backend, &["memory", "sqlite"])?;
        one_of("queue.backend", &self.queue.backend, &["memory", "sqlite"])?;

        if self.store.backend == "sqlite" && self.store.url.is_empty() {
            return Err(invalid("store.url", "url must not be empty for sqlite backend"));
        }
        if self.queue.backend == "sqlite" && self.store.backend != "sqlite" {
            return Err(invalid(
                "queue.backend",
                "sqlite queue requires the sqlite store backend",
            ));
        }
        if self.store.max_connections == 0 {
            return Err(invalid("store.max_connections", "must be greater than 0"));
        }

        if self.worker.default_concurrency == 0 || self.worker.heavy_concurrency == 0 {
            return Err(invalid(
                "worker.concurrency",
                "each lane needs at least one worker",
            ));
        }
        if self.worker.default_timeout_secs == 0 || self.worker.heavy_timeout_secs == 0 {
            return Err(invalid("worker.timeout_secs", "must be greater than 0"));
        }
        if self.worker.reconcile_interval_secs == 0 {
            return Err(invalid(
                "worker.reconcile_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.queue.backend == "sqlite" && self.queue.lease_secs <= self.worker.heavy_timeout_secs
        {
            return Err(invalid(
                "queue.lease_secs",
                "lease must outlast worker.heavy_timeout_secs",
            ));
        }

        for name in &self.modules.enabled {
            if !BUILTIN_MODULES.contains(&name.as_str()) {
                return Err(invalid(
                    "modules.enabled",
                    &format!(
                        "unknown module '{name}', expected one of: {}",
                        BUILTIN_MODULES.join(", ")
                    ),
                ));
            }
        }

        if self.modules.dorks.max_dorks == 0 || self.modules.dorks.max_total_results == 0 {
            return Err(invalid("modules.dorks", "limits must be greater than 0"));
        }
        if self.modules.ssl.port == 0 {
            return Err(invalid("modules.ssl.port", "must be greater than 0"));
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is currently supported",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> CentinelaError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
    .into()
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), CentinelaError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(
            field,
            &format!("must be one of: {}", allowed.join(", ")),
        ))
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/centinela".to_owned(),
            pid_file: "/var/run/centinela.pid".to_owned(),
        }
    }
}

/// 상태 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 백엔드 (memory, sqlite)
    pub backend: String,
    /// sqlite 연결 문자열
    pub url: String,
    /// 최대 연결 수
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_owned(),
            url: "sqlite:///var/lib/centinela/centinela.db".to_owned(),
            max_connections: 8,
        }
    }
}

/// 작업 큐 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 백엔드 (memory, sqlite)
    pub backend: String,
    /// 전달 후 ack 없이 재전달되기까지의 임대 시간 (초)
    pub lease_secs: u64,
    /// 빈 레인 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_owned(),
            lease_secs: 1800,
            poll_interval_ms: 500,
        }
    }
}

impl QueueConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 워커 풀 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// default 레인 동시 실행 수
    pub default_concurrency: usize,
    /// heavy 레인 동시 실행 수
    pub heavy_concurrency: usize,
    /// default 레인 모듈 실행 제한 시간 (초)
    pub default_timeout_secs: u64,
    /// heavy 레인 모듈 실행 제한 시간 (초)
    pub heavy_timeout_secs: u64,
    /// 정체된 스캔 재정산 주기 (초)
    pub reconcile_interval_secs: u64,
    /// 처리 실패한 작업을 다시 전달하기까지의 대기 시간 (초)
    pub retry_delay_secs: u64,
    /// 레인 제한 시간을 넘긴 `running` 선점을 다른 실행기가 인수하기 전 여유 시간 (초)
    pub claim_grace_secs: u64,
    /// 시작 시 pending 실행 재제출 여부
    pub recover_on_start: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: 8,
            heavy_concurrency: 2,
            default_timeout_secs: 120,
            heavy_timeout_secs: 900,
            reconcile_interval_secs: 30,
            retry_delay_secs: 5,
            claim_grace_secs: 60,
            recover_on_start: true,
        }
    }
}

impl WorkerConfig {
    /// 레인별 동시 실행 수
    pub fn concurrency(&self, lane: Lane) -> usize {
        match lane {
            Lane::Default => self.default_concurrency,
            Lane::Heavy => self.heavy_concurrency,
        }
    }

    /// 레인별 모듈 실행 제한 시간
    pub fn timeout(&self, lane: Lane) -> Duration {
        match lane {
            Lane::Default => Duration::from_secs(self.default_timeout_secs),
            Lane::Heavy => Duration::from_secs(self.heavy_timeout_secs),
        }
    }

    /// 레인별 선점 임대 기간: 제한 시간 + 여유 시간.
    ///
    /// 이 기간이 지나도록 종료되지 않은 `running` 실행은 재전달 시 인수됩니다.
    pub fn claim_lease(&self, lane: Lane) -> Duration {
        self.timeout(lane).saturating_add(Duration::from_secs(self.claim_grace_secs))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

/// 정찰 모듈 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// 레지스트리에 등록할 모듈 목록
    pub enabled: Vec<String>,
    pub dns: DnsModuleConfig,
    pub dorks: DorksModuleConfig,
    pub headerhttp: HeaderHttpModuleConfig,
    pub nmap: NmapModuleConfig,
    pub ssl: SslModuleConfig,
    pub whois: WhoisModuleConfig,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            enabled: BUILTIN_MODULES.iter().map(|s| (*s).to_owned()).collect(),
            dns: DnsModuleConfig::default(),
            dorks: DorksModuleConfig::default(),
            headerhttp: HeaderHttpModuleConfig::default(),
            nmap: NmapModuleConfig::default(),
            ssl: SslModuleConfig::default(),
            whois: WhoisModuleConfig::default(),
        }
    }
}

/// dns 모듈 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsModuleConfig {
    /// 질의 타임아웃 (초)
    pub timeout_secs: u64,
    /// 조회할 레코드 타입
    pub record_types: Vec<String>,
}

impl Default for DnsModuleConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            record_types: ["A", "AAAA", "CNAME", "MX", "NS", "SOA", "TXT"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

/// dorks 모듈 설정 (Google Custom Search)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DorksModuleConfig {
    /// API 키
    pub api_key: String,
    /// 검색 엔진 ID (cx)
    pub search_engine_id: String,
    /// 검색 API 엔드포인트
    pub endpoint: String,
    /// 실행할 최대 dork 수
    pub max_dorks: usize,
    /// dork당 결과 수
    pub results_per_dork: usize,
    /// 전체 결과 상한
    pub max_total_results: usize,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for DorksModuleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            search_engine_id: String::new(),
            endpoint: "https://www.googleapis.com/customsearch/v1".to_owned(),
            max_dorks: 5,
            results_per_dork: 1,
            max_total_results: 5,
            timeout_secs: 10,
        }
    }
}

/// headerhttp 모듈 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderHttpModuleConfig {
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// User-Agent 헤더
    pub user_agent: String,
}

impl Default for HeaderHttpModuleConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            user_agent: concat!("centinela/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

/// nmap 모듈 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NmapModuleConfig {
    /// nmap 실행 파일
    pub binary: String,
    /// 검사할 포트 목록 (nmap `-p` 형식)
    pub ports: String,
    /// 서비스 버전 탐지(`-sV`) 여부
    pub service_detection: bool,
}

impl Default for NmapModuleConfig {
    fn default() -> Self {
        Self {
            binary: "nmap".to_owned(),
            ports: "21,22,23,25,53,80,110,143,443,3306,3389".to_owned(),
            service_detection: true,
        }
    }
}

/// ssl 모듈 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SslModuleConfig {
    /// TLS 포트
    pub port: u16,
    /// 연결 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for SslModuleConfig {
    fn default() -> Self {
        Self {
            port: 443,
            timeout_secs: 5,
        }
    }
}

/// whois 모듈 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhoisModuleConfig {
    /// 최초 질의 서버
    pub server: String,
    /// 질의 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for WhoisModuleConfig {
    fn default() -> Self {
        Self {
            server: "whois.iana.org".to_owned(),
            timeout_secs: 10,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
