//! headerhttp 모듈 -- HTTP 응답 헤더와 누락된 보안 헤더 점검
//!
//! `https://<target>`에 GET 요청을 보냅니다. 인증서 검증은 하지 않습니다.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::{Value, json};
use tracing::{debug, info};

use centinela_core::config::HeaderHttpModuleConfig;
use centinela_core::error::ModuleError;
use centinela_core::module::{ModuleInfo, ResourceClass, ScanModule};
use centinela_core::types::{Target, TargetKind};

/// 점검하는 보안 헤더 (헤더 이름, 누락 시 설명)
const SECURITY_HEADERS: [(&str, &str); 5] = [
    (
        "strict-transport-security",
        "HSTS not configured (Strict-Transport-Security)",
    ),
    (
        "x-frame-options",
        "Clickjacking protection missing (X-Frame-Options)",
    ),
    (
        "x-content-type-options",
        "MIME sniffing protection missing (X-Content-Type-Options)",
    ),
    (
        "content-security-policy",
        "Content security policy missing (Content-Security-Policy)",
    ),
    ("referrer-policy", "Referrer policy not defined (Referrer-Policy)"),
];

/// HTTP 헤더 점검 모듈
pub struct HeaderHttpModule {
    info: ModuleInfo,
    timeout: Duration,
    user_agent: String,
}

impl HeaderHttpModule {
    pub fn new(config: &HeaderHttpModuleConfig) -> Self {
        Self {
            info: ModuleInfo::new(
                "headerhttp",
                "Fetches HTTPS response headers and reports missing security headers",
                ResourceClass::Standard,
            ),
            timeout: Duration::from_secs(config.timeout_secs),
            user_agent: config.user_agent.clone(),
        }
    }
}

fn target_url(target: &Target) -> String {
    match target.kind() {
        TargetKind::Ip if target.value().contains(':') => format!("https://[{}]", target.value()),
        _ => format!("https://{}", target.value()),
    }
}

/// 헤더 맵을 JSON 객체로 바꿉니다. 같은 이름이 여러 번 오면 `, `로 합칩니다.
fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = value
            .to_str()
            .map(str::to_owned)
            .unwrap_or_else(|_| "[invalid UTF-8]".to_owned());
        map.entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

/// 누락된 보안 헤더 설명 목록
fn missing_security_headers(headers: &HeaderMap) -> Vec<&'static str> {
    SECURITY_HEADERS
        .iter()
        .filter(|(name, _)| !headers.contains_key(*name))
        .map(|(_, issue)| *issue)
        .collect()
}

impl ScanModule for HeaderHttpModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    async fn execute(&self, target: &Target) -> Result<Value, ModuleError> {
        let url = target_url(target);
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ModuleError::Unavailable(format!("http client: {e}")))?;

        debug!(url = %url, "fetching headers");
        let response = client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ModuleError::Timeout {
                    secs: self.timeout.as_secs(),
                }
            } else {
                ModuleError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers();
        let issues = missing_security_headers(headers);
        info!(url = %url, status = status.as_u16(), missing = issues.len(), "headers fetched");

        Ok(json!({
            "url": url,
            "final_url": response.url().as_str(),
            "status": status.as_u16(),
            "headers": headers_to_map(headers),
            "security_issues": issues,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn header_map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        map
    }

    #[test]
    fn all_security_headers_missing() {
        let issues = missing_security_headers(&header_map(&[("server", "nginx")]));
        assert_eq!(issues.len(), SECURITY_HEADERS.len());
    }

    #[test]
    fn present_headers_are_not_reported() {
        let headers = header_map(&[
            ("strict-transport-security", "max-age=63072000"),
            ("x-frame-options", "DENY"),
            ("content-security-policy", "default-src 'self'"),
        ]);
        let issues = missing_security_headers(&headers);
        assert_eq!(
            issues,
            [
                "MIME sniffing protection missing (X-Content-Type-Options)",
                "Referrer policy not defined (Referrer-Policy)",
            ]
        );
    }

    #[test]
    fn repeated_headers_are_joined() {
        let headers = header_map(&[("set-cookie", "a=1"), ("set-cookie", "b=2")]);
        let map = headers_to_map(&headers);
        assert_eq!(map["set-cookie"], "a=1, b=2");
    }

    #[test]
    fn ipv6_targets_are_bracketed() {
        assert_eq!(
            target_url(&Target::parse("2001:db8::1").unwrap()),
            "https://[2001:db8::1]"
        );
        assert_eq!(
            target_url(&Target::parse("example.com").unwrap()),
            "https://example.com"
        );
    }
}
