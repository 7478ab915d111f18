//! dorks 모듈 -- Google Custom Search로 노출 파일/경로 탐색
//!
//! 고정된 검색 템플릿을 최대 `max_dorks`개까지 실행하고 결과를
//! `{"domain", "dorks": [{"description", "query", "results": [...]}], "total_results"}`로
//! 모읍니다. 자격 증명이 없으면 모듈은 `unavailable`로 실패합니다.
//! 개별 검색 요청의 실패는 해당 dork의 `error` 필드에 남습니다.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use centinela_core::config::DorksModuleConfig;
use centinela_core::error::ModuleError;
use centinela_core::module::{ModuleInfo, ResourceClass, ScanModule};
use centinela_core::types::Target;

use crate::require_domain;

/// (검색 템플릿, 설명). `{domain}`이 대상 도메인으로 치환됩니다.
const DORK_TEMPLATES: [(&str, &str); 5] = [
    ("site:{domain} filetype:sql", "SQL dumps"),
    (
        "site:{domain} (filetype:env OR filetype:cfg OR filetype:conf OR filetype:ini)",
        "Configuration files",
    ),
    (
        "site:{domain} intitle:\"index of\" (backup OR .bak)",
        "Backups and open directory listings",
    ),
    (
        "site:{domain} (filetype:doc OR filetype:docx OR filetype:pdf)",
        "Office and PDF documents",
    ),
    (
        "site:{domain} inurl:(admin OR dashboard OR config OR configs OR log OR logs OR \"error.log\" OR \"access.log\" OR \"wp-config.php\") -site:github.com -site:gitlab.com -site:stackoverflow.com",
        "Exposed admin URLs, logs and config",
    ),
];

/// Custom Search API가 허용하는 요청당 최대 결과 수
const MAX_RESULTS_PER_REQUEST: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
}

/// 검색 dork 모듈
pub struct DorksModule {
    info: ModuleInfo,
    config: DorksModuleConfig,
}

impl DorksModule {
    pub fn new(config: &DorksModuleConfig) -> Self {
        Self {
            info: ModuleInfo::new(
                "dorks",
                "Runs search-engine dorks for exposed files via Google Custom Search",
                ResourceClass::Standard,
            ),
            config: config.clone(),
        }
    }

    async fn search(
        &self,
        client: &reqwest::Client,
        query: &str,
        num: usize,
    ) -> Result<Vec<SearchItem>, ModuleError> {
        let num = num.to_string();
        let response = client
            .get(&self.config.endpoint)
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("cx", self.config.search_engine_id.as_str()),
                ("q", query),
                ("start", "1"),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ModuleError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModuleError::Network(format!("search API returned {status}")));
        }
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ModuleError::Parse(format!("search API response: {e}")))?;
        Ok(body.items)
    }
}

/// 실행할 검색어 목록 (템플릿 순서, 최소 1개, 최대 5개)
fn build_queries(domain: &str, max_dorks: usize) -> Vec<(String, &'static str)> {
    let count = max_dorks.clamp(1, DORK_TEMPLATES.len());
    DORK_TEMPLATES
        .iter()
        .take(count)
        .map(|(template, description)| (template.replace("{domain}", domain), *description))
        .collect()
}

impl ScanModule for DorksModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    async fn execute(&self, target: &Target) -> Result<Value, ModuleError> {
        let domain = require_domain(target, &self.info.name)?;
        if self.config.api_key.is_empty() || self.config.search_engine_id.is_empty() {
            return Err(ModuleError::Unavailable(
                "search API key or search engine id is not configured".to_owned(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| ModuleError::Unavailable(format!("http client: {e}")))?;

        let per_request = self.config.results_per_dork.clamp(1, MAX_RESULTS_PER_REQUEST);
        let mut dorks = Vec::new();
        let mut total = 0usize;

        for (query, description) in build_queries(domain, self.config.max_dorks) {
            debug!(domain, query = %query, "running dork");
            let entry = match self.search(&client, &query, per_request).await {
                Ok(items) => {
                    let remaining = self.config.max_total_results.saturating_sub(total);
                    let results: Vec<Value> = items
                        .into_iter()
                        .take(remaining)
                        .map(|item| {
                            json!({
                                "title": item.title,
                                "snippet": item.snippet,
                                "link": item.link,
                            })
                        })
                        .collect();
                    total += results.len();
                    json!({ "description": description, "query": query, "results": results })
                }
                Err(e) => {
                    warn!(domain, query = %query, error = %e, "dork query failed");
                    json!({
                        "description": description,
                        "query": query,
                        "results": [],
                        "error": e.to_string(),
                    })
                }
            };
            dorks.push(entry);

            if total >= self.config.max_total_results {
                break;
            }
        }

        info!(domain, dorks = dorks.len(), results = total, "dorks finished");
        Ok(json!({
            "domain": domain,
            "dorks": dorks,
            "total_results": total,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_substitute_domain_and_respect_limits() {
        let queries = build_queries("example.com", 2);
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].0, "site:example.com filetype:sql");
        assert!(queries[1].0.contains("filetype:env"));

        assert_eq!(build_queries("example.com", 0).len(), 1);
        assert_eq!(build_queries("example.com", 50).len(), DORK_TEMPLATES.len());
    }

    #[test]
    fn every_template_mentions_domain() {
        assert!(DORK_TEMPLATES.iter().all(|(t, _)| t.contains("{domain}")));
    }

    #[test]
    fn search_response_tolerates_missing_items() {
        let body: SearchResponse =
            serde_json::from_str(r#"{"kind":"customsearch#search"}"#).unwrap();
        assert!(body.items.is_empty());

        let body: SearchResponse = serde_json::from_str(
            r#"{"items":[{"title":"db.sql","link":"https://example.com/db.sql"}]}"#,
        )
        .unwrap();
        assert_eq!(body.items[0].link.as_deref(), Some("https://example.com/db.sql"));
        assert!(body.items[0].snippet.is_none());
    }

    #[tokio::test]
    async fn missing_credentials_is_unavailable() {
        let module = DorksModule::new(&DorksModuleConfig::default());
        let err = module
            .execute(&Target::parse("example.com").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unavailable");
    }
}
