//! whois 모듈 -- TCP/43 WHOIS 질의와 추천(referral) 추적
//!
//! 설정된 서버(기본 `whois.iana.org`)에 먼저 묻고, 응답의 `refer:` 또는
//! `Registrar WHOIS Server:`를 따라 최대 [`MAX_HOPS`]번 질의합니다.
//! 뒤에 받은 응답의 필드가 우선하며, 없는 필드는 앞선 응답에서 채웁니다.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use centinela_core::config::WhoisModuleConfig;
use centinela_core::error::ModuleError;
use centinela_core::module::{ModuleInfo, ResourceClass, ScanModule};
use centinela_core::types::Target;

use crate::require_domain;

/// 최대 질의 서버 수
pub const MAX_HOPS: usize = 3;

const WHOIS_PORT: u16 = 43;

/// 응답 크기 상한
const MAX_RESPONSE_BYTES: u64 = 512 * 1024;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
        .unwrap_or_else(|e| unreachable!("static email regex is valid: {e}"))
});

/// WHOIS 응답에서 추출한 필드
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WhoisRecord {
    pub domain_name: Option<String>,
    pub registrar: Option<String>,
    pub creation_date: Option<String>,
    pub expiration_date: Option<String>,
    pub updated_date: Option<String>,
    pub name_servers: Vec<String>,
    pub status: Vec<String>,
    pub emails: Vec<String>,
    pub country: Option<String>,
    pub whois_server: Option<String>,
    #[serde(skip)]
    pub referral: Option<String>,
    pub raw: Option<String>,
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value.to_owned());
    }
}

impl WhoisRecord {
    /// `key: value` 형식의 WHOIS 응답을 파싱합니다.
    pub fn parse(text: &str) -> Self {
        let mut record = Self::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty()
                || line.starts_with('%')
                || line.starts_with('#')
                || line.starts_with(">>>")
            {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "domain name" | "domain" => {
                    set_once(&mut record.domain_name, &value.to_ascii_lowercase())
                }
                "registrar" | "sponsoring registrar" | "registrar name" => {
                    set_once(&mut record.registrar, value)
                }
                "creation date" | "created" | "registered on" | "registration time" => {
                    set_once(&mut record.creation_date, value)
                }
                "registry expiry date"
                | "registrar registration expiration date"
                | "expiry date"
                | "expiration date"
                | "expires"
                | "paid-till" => set_once(&mut record.expiration_date, value),
                "updated date" | "last-modified" | "changed" | "last updated" => {
                    set_once(&mut record.updated_date, value)
                }
                "name server" | "nserver" | "nameserver" => {
                    let host = value
                        .split_whitespace()
                        .next()
                        .unwrap_or("")
                        .trim_end_matches('.')
                        .to_ascii_lowercase();
                    push_unique(&mut record.name_servers, host);
                }
                "domain status" | "status" => push_unique(&mut record.status, value.to_owned()),
                "registrant country" | "country" => set_once(&mut record.country, value),
                "registrar whois server" | "whois" => set_once(&mut record.whois_server, value),
                "refer" => set_once(&mut record.referral, value),
                _ => {}
            }
        }

        for m in EMAIL_RE.find_iter(text) {
            push_unique(&mut record.emails, m.as_str().to_ascii_lowercase());
        }
        record.raw = Some(text.to_owned());
        record
    }

    /// 다음에 질의할 서버 (`refer:` 우선)
    pub fn next_server(&self) -> Option<&str> {
        self.referral
            .as_deref()
            .or(self.whois_server.as_deref())
            .map(|s| s.trim_start_matches("whois://").trim_end_matches('/'))
            .filter(|s| !s.is_empty())
    }

    /// 뒤 응답(`newer`)의 필드를 우선하여 합칩니다.
    pub fn merge(self, newer: WhoisRecord) -> WhoisRecord {
        fn pick(newer: Option<String>, older: Option<String>) -> Option<String> {
            newer.or(older)
        }
        fn pick_list(newer: Vec<String>, older: Vec<String>) -> Vec<String> {
            if newer.is_empty() { older } else { newer }
        }
        WhoisRecord {
            domain_name: pick(newer.domain_name, self.domain_name),
            registrar: pick(newer.registrar, self.registrar),
            creation_date: pick(newer.creation_date, self.creation_date),
            expiration_date: pick(newer.expiration_date, self.expiration_date),
            updated_date: pick(newer.updated_date, self.updated_date),
            name_servers: pick_list(newer.name_servers, self.name_servers),
            status: pick_list(newer.status, self.status),
            emails: pick_list(newer.emails, self.emails),
            country: pick(newer.country, self.country),
            whois_server: pick(newer.whois_server, self.whois_server),
            referral: newer.referral,
            raw: pick(newer.raw, self.raw),
        }
    }
}

/// WHOIS 조회 모듈
pub struct WhoisModule {
    info: ModuleInfo,
    server: String,
    timeout: Duration,
}

impl WhoisModule {
    pub fn new(config: &WhoisModuleConfig) -> Self {
        Self {
            info: ModuleInfo::new(
                "whois",
                "Queries WHOIS over TCP/43 following registry referrals",
                ResourceClass::Standard,
            ),
            server: config.server.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn query(&self, server: &str, domain: &str) -> Result<String, ModuleError> {
        let exchange = async {
            let mut stream = TcpStream::connect((server, WHOIS_PORT))
                .await
                .map_err(|e| ModuleError::Network(format!("connect {server}: {e}")))?;
            stream
                .write_all(format!("{domain}\r\n").as_bytes())
                .await
                .map_err(|e| ModuleError::Network(format!("write {server}: {e}")))?;

            let mut buf = Vec::new();
            (&mut stream)
                .take(MAX_RESPONSE_BYTES)
                .read_to_end(&mut buf)
                .await
                .map_err(|e| ModuleError::Network(format!("read {server}: {e}")))?;
            Ok::<_, ModuleError>(String::from_utf8_lossy(&buf).into_owned())
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ModuleError::Timeout {
                secs: self.timeout.as_secs(),
            })?
    }
}

impl ScanModule for WhoisModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    async fn execute(&self, target: &Target) -> Result<Value, ModuleError> {
        let domain = require_domain(target, &self.info.name)?;

        let mut server = self.server.clone();
        let mut visited: Vec<String> = Vec::new();
        let mut merged: Option<WhoisRecord> = None;

        for _ in 0..MAX_HOPS {
            debug!(domain, server = %server, "whois query");
            let text = match self.query(&server, domain).await {
                Ok(text) => text,
                // 첫 서버 이후의 실패는 지금까지 받은 응답으로 마무리
                Err(e) if merged.is_some() => {
                    warn!(domain, server = %server, error = %e, "whois referral query failed");
                    break;
                }
                Err(e) => return Err(e),
            };
            visited.push(server.clone());

            let record = WhoisRecord::parse(&text);
            let next = record.next_server().map(str::to_owned);
            merged = Some(match merged {
                Some(older) => older.merge(record),
                None => record,
            });

            match next {
                Some(next) if !visited.iter().any(|s| s.eq_ignore_ascii_case(&next)) => {
                    server = next
                }
                _ => break,
            }
        }

        let mut record = merged.unwrap_or_default();
        if record.domain_name.is_none() {
            record.domain_name = Some(domain.to_owned());
        }
        record.whois_server = visited.last().cloned();

        info!(
            domain,
            servers = visited.len(),
            registrar = record.registrar.as_deref().unwrap_or("-"),
            "whois finished"
        );

        let mut document = serde_json::to_value(&record)
            .map_err(|e| ModuleError::Parse(format!("whois record: {e}")))?;
        if let Some(obj) = document.as_object_mut() {
            obj.insert("queried_servers".to_owned(), Value::from(visited));
        }
        Ok(document)
    }
}
