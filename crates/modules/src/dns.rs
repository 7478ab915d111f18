//! dns 모듈 -- 레코드 타입별 조회와 네임서버 IP 수집
//!
//! 결과 문서:
//! ```json
//! {
//!   "domain": "example.com",
//!   "records": { "A": ["93.184.216.34"], "MX": [], ... },
//!   "ns_ips": ["93.184.216.34", "199.43.135.53"],
//!   "meta": { "errors": { "MX": "..." }, "ns_resolution_errors": {}, "resolved_at": "..." }
//! }
//! ```
//!
//! 타입별 조회 실패는 모듈 실패가 아니며 `meta.errors`에 남습니다.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use serde_json::{Value, json};
use tracing::{debug, info};

use centinela_core::config::DnsModuleConfig;
use centinela_core::error::ModuleError;
use centinela_core::module::{ModuleInfo, ResourceClass, ScanModule};
use centinela_core::types::Target;

use crate::require_domain;

/// DNS 레코드 조회 모듈
pub struct DnsModule {
    info: ModuleInfo,
    timeout: Duration,
    record_types: Vec<String>,
}

impl DnsModule {
    pub fn new(config: &DnsModuleConfig) -> Self {
        Self {
            info: ModuleInfo::new(
                "dns",
                "Resolves A, AAAA, CNAME, MX, NS, SOA and TXT records",
                ResourceClass::Standard,
            ),
            timeout: Duration::from_secs(config.timeout_secs),
            record_types: config.record_types.clone(),
        }
    }

    fn resolver(&self) -> TokioAsyncResolver {
        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 1;
        TokioAsyncResolver::tokio(ResolverConfig::default(), opts)
    }
}

/// 설정의 레코드 타입 이름을 파싱합니다.
fn parse_record_types(names: &[String]) -> Result<Vec<(String, RecordType)>, ModuleError> {
    names
        .iter()
        .map(|name| {
            let upper = name.trim().to_ascii_uppercase();
            RecordType::from_str(&upper)
                .map(|rt| (upper.clone(), rt))
                .map_err(|_| {
                    ModuleError::Unavailable(format!("unsupported DNS record type: {name}"))
                })
        })
        .collect()
}

/// 순서를 유지하며 중복을 제거합니다.
fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|ip| seen.insert(ip.clone())).collect()
}

impl ScanModule for DnsModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    async fn execute(&self, target: &Target) -> Result<Value, ModuleError> {
        let domain = require_domain(target, &self.info.name)?;
        let types = parse_record_types(&self.record_types)?;
        let resolver = self.resolver();

        let mut records: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut errors: BTreeMap<String, String> = BTreeMap::new();

        for (name, record_type) in &types {
            debug!(domain, record_type = %name, "dns lookup");
            match resolver.lookup(domain, *record_type).await {
                Ok(lookup) => {
                    let values = lookup.iter().map(|rdata| rdata.to_string()).collect();
                    records.insert(name.clone(), values);
                }
                Err(e) => {
                    records.insert(name.clone(), Vec::new());
                    errors.insert(name.clone(), e.to_string());
                }
            }
        }

        // 도메인 A 레코드 + 각 NS 호스트의 A 레코드
        let mut ips: Vec<String> = records.get("A").cloned().unwrap_or_default();
        let mut ns_errors: BTreeMap<String, String> = BTreeMap::new();
        let ns_hosts: Vec<String> = records
            .get("NS")
            .map(|hosts| hosts.iter().map(|h| h.trim_end_matches('.').to_owned()).collect())
            .unwrap_or_default();
        for host in ns_hosts {
            match resolver.ipv4_lookup(host.as_str()).await {
                Ok(lookup) => ips.extend(lookup.iter().map(|a| a.to_string())),
                Err(e) => {
                    ns_errors.insert(host, e.to_string());
                }
            }
        }
        let ns_ips = dedup_preserving_order(ips);

        info!(
            domain,
            record_types = types.len(),
            failed_types = errors.len(),
            ns_ips = ns_ips.len(),
            "dns resolution finished"
        );

        Ok(json!({
            "domain": domain,
            "records": records,
            "ns_ips": ns_ips,
            "meta": {
                "errors": errors,
                "ns_resolution_errors": ns_errors,
                "resolved_at": Utc::now().to_rfc3339(),
            },
        }))
    }
}
