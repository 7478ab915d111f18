//! 도메인 타입 — 스캔, 모듈 실행, 대상
//!
//! [`Scan`]은 사용자 요청 하나를 나타내는 집계(aggregate)이고,
//! [`ModuleExecution`]은 그 스캔에 속한 모듈 실행 하나를 나타냅니다.
//!
//! # 상태 전이
//! ```text
//! ModuleExecution: pending → running → { completed | error }
//! Scan:            running → completed   (모든 실행이 종료 상태일 때)
//! ```

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SubmissionError;

/// 도메인 이름 형식 (라벨 63자 제한, 알파벳 TLD 2자 이상)
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$")
        .unwrap_or_else(|e| unreachable!("static domain regex is valid: {e}"))
});

// ─── 식별자 ─────────────────────────────────────────────────────────

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// 새 UUID v4 식별자를 생성합니다.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// 내부 UUID를 반환합니다.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// 스캔 식별자 (불투명 UUID v4)
    ScanId
);

uuid_id!(
    /// 모듈 실행 식별자 (불투명 UUID v4)
    ExecutionId
);

// ─── 대상 ───────────────────────────────────────────────────────────

/// 대상 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// IPv4 또는 IPv6 주소
    Ip,
    /// 도메인 이름
    Domain,
}

impl TargetKind {
    /// 저장/출력용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Domain => "domain",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip" => Ok(Self::Ip),
            "domain" => Ok(Self::Domain),
            other => Err(format!("unknown target kind: {other}")),
        }
    }
}

/// 검증된 스캔 대상
///
/// [`Target::parse`]로만 생성되므로 항상 유효한 IP 또는 도메인입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    value: String,
    kind: TargetKind,
}

impl Target {
    /// 문자열을 IP 주소 또는 도메인으로 해석합니다.
    ///
    /// IP 해석을 먼저 시도하고, 실패하면 도메인 형식을 검사합니다.
    /// 도메인은 소문자로 정규화됩니다.
    pub fn parse(raw: &str) -> Result<Self, SubmissionError> {
        let trimmed = raw.trim();
        if let Ok(ip) = trimmed.parse::<IpAddr>() {
            return Ok(Self {
                value: ip.to_string(),
                kind: TargetKind::Ip,
            });
        }
        if DOMAIN_RE.is_match(trimmed) {
            return Ok(Self {
                value: trimmed.to_ascii_lowercase(),
                kind: TargetKind::Domain,
            });
        }
        Err(SubmissionError::InvalidTarget {
            target: raw.to_owned(),
        })
    }

    /// 저장소에서 읽은 값으로 대상을 복원합니다 (검증 생략).
    pub fn from_parts(value: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            value: value.into(),
            kind,
        }
    }

    /// 정규화된 대상 문자열
    pub fn value(&self) -> &str {
        &self.value
    }

    /// 대상 종류
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// 도메인 대상이면 `true`
    pub fn is_domain(&self) -> bool {
        self.kind == TargetKind::Domain
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// ─── 상태 ───────────────────────────────────────────────────────────

/// 스캔 상태
///
/// 코어는 `running`으로 생성하고 `completed`로만 전이시킵니다.
/// `pending`과 `error`는 외부 도구와의 호환을 위해 유지됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl ScanStatus {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// 저장/출력용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown scan status: {other}")),
        }
    }
}

/// 모듈 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl ExecutionStatus {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// 허용된 전이인지 검사합니다.
    ///
    /// `pending → running`, `running → completed`, `running → error`만 허용됩니다.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Error)
        )
    }

    /// 저장/출력용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

// ─── 엔티티 ─────────────────────────────────────────────────────────

/// 스캔 집계
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    /// 스캔 ID
    pub id: ScanId,
    /// 요청자 식별자
    pub owner: String,
    /// 스캔 대상
    pub target: Target,
    /// 현재 상태
    pub status: ScanStatus,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 마지막 상태 변경 시각
    pub updated_at: DateTime<Utc>,
}

impl Scan {
    /// 실행 중 상태의 새 스캔을 만듭니다.
    pub fn new_running(owner: impl Into<String>, target: Target) -> Self {
        let now = Utc::now();
        Self {
            id: ScanId::new(),
            owner: owner.into(),
            target,
            status: ScanStatus::Running,
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Display for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scan {} [{}] {} ({})",
            self.id, self.status, self.target, self.target.kind()
        )
    }
}

/// 모듈 실행 행
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleExecution {
    /// 실행 ID
    pub id: ExecutionId,
    /// 소속 스캔 ID
    pub scan_id: ScanId,
    /// 모듈 이름
    pub module: String,
    /// 현재 상태
    pub status: ExecutionStatus,
    /// 결과 문서 (종료 전에는 `{}`)
    pub result: serde_json::Value,
    /// 행 생성 시각
    pub executed_at: DateTime<Utc>,
    /// 종료 시각
    pub finished_at: Option<DateTime<Utc>>,
    /// 선점 횟수. 선점(또는 인수)할 때마다 1씩 증가하며 선점 토큰으로 쓰입니다.
    #[serde(default)]
    pub attempt: u32,
    /// 마지막 선점 시각
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl ModuleExecution {
    /// 대기 상태의 새 실행 행을 만듭니다.
    pub fn new_pending(scan_id: ScanId, module: impl Into<String>) -> Self {
        Self {
            id: ExecutionId::new(),
            scan_id,
            module: module.into(),
            status: ExecutionStatus::Pending,
            result: serde_json::Value::Object(serde_json::Map::new()),
            executed_at: Utc::now(),
            finished_at: None,
            attempt: 0,
            claimed_at: None,
        }
    }

    /// 선점이 `lease`보다 오래되었으면 `true`. 선점 시각이 없는 `running` 행도 만료로 봅니다.
    pub fn claim_expired(&self, lease: Duration, now: DateTime<Utc>) -> bool {
        self.claim_remaining(lease, now).is_zero()
    }

    /// 선점이 만료되기까지 남은 시간
    pub fn claim_remaining(&self, lease: Duration, now: DateTime<Utc>) -> Duration {
        let Some(claimed_at) = self.claimed_at else {
            return Duration::ZERO;
        };
        let expires_at = chrono::Duration::from_std(lease)
            .ok()
            .and_then(|d| claimed_at.checked_add_signed(d));
        match expires_at {
            Some(expires_at) => (expires_at - now).to_std().unwrap_or(Duration::ZERO),
            // 표현할 수 없을 만큼 긴 임대는 만료되지 않음
            None => lease,
        }
    }
}

impl fmt::Display for ModuleExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.module, self.status, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_and_ipv6() {
        let v4 = Target::parse("192.168.1.10").unwrap();
        assert_eq!(v4.kind(), TargetKind::Ip);
        assert_eq!(v4.value(), "192.168.1.10");

        let v6 = Target::parse("2001:db8::1").unwrap();
        assert_eq!(v6.kind(), TargetKind::Ip);
    }

    #[test]
    fn parses_domain_and_normalizes_case() {
        let target = Target::parse("  Example.COM ").unwrap();
        assert_eq!(target.kind(), TargetKind::Domain);
        assert_eq!(target.value(), "example.com");
        assert!(target.is_domain());
    }

    #[test]
    fn rejects_invalid_targets() {
        for raw in [
            "",
            "localhost",
            "http://example.com",
            "exa mple.com",
            "-bad.example.com",
            "example.c0m",
            "999.1.1.1.1",
        ] {
            assert!(
                matches!(
                    Target::parse(raw),
                    Err(SubmissionError::InvalidTarget { .. })
                ),
                "'{raw}' should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overlong_label() {
        let label = "a".repeat(64);
        assert!(Target::parse(&format!("{label}.com")).is_err());
        let label = "a".repeat(63);
        assert!(Target::parse(&format!("{label}.com")).is_ok());
    }

    #[test]
    fn execution_transitions() {
        use ExecutionStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Error));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Error.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Pending));
    }

    #[test]
    fn terminal_states() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Error.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ScanStatus::Completed.is_terminal());
        assert!(!ScanStatus::Running.is_terminal());
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert!("finished".parse::<ScanStatus>().is_err());
    }

    #[test]
    fn new_execution_starts_pending_with_empty_result() {
        let scan_id = ScanId::new();
        let exec = ModuleExecution::new_pending(scan_id, "dns");
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert_eq!(exec.result, serde_json::json!({}));
        assert_eq!(exec.scan_id, scan_id);
        assert!(exec.finished_at.is_none());
        assert_eq!(exec.attempt, 0);
        assert!(exec.claimed_at.is_none());
    }

    #[test]
    fn claim_lease_expiry() {
        let now = Utc::now();
        let exec = ModuleExecution {
            status: ExecutionStatus::Running,
            attempt: 1,
            claimed_at: Some(now - chrono::Duration::seconds(10)),
            ..ModuleExecution::new_pending(ScanId::new(), "nmap")
        };

        assert!(!exec.claim_expired(Duration::from_secs(60), now));
        let remaining = exec.claim_remaining(Duration::from_secs(60), now);
        assert!(remaining > Duration::from_secs(49) && remaining <= Duration::from_secs(50));

        assert!(exec.claim_expired(Duration::from_secs(10), now));
        assert_eq!(exec.claim_remaining(Duration::from_secs(5), now), Duration::ZERO);

        // 선점 시각이 없는 running 행은 바로 인수 가능
        let legacy = ModuleExecution {
            claimed_at: None,
            ..exec
        };
        assert!(legacy.claim_expired(Duration::from_secs(3600), now));
    }

    #[test]
    fn scan_id_parses_from_display() {
        let id = ScanId::new();
        let parsed: ScanId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ScanId>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ScanStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
