#![doc = include_str!("../README.md")]
//!
//! # 모듈 구조
//!
//! - [`dns`]: 레코드 타입별 DNS 조회
//! - [`dorks`]: 검색 엔진 dork
//! - [`headerhttp`]: HTTP 보안 헤더 점검
//! - [`nmap`]: 외부 nmap 포트 스캔 (heavy)
//! - [`ssl`]: TLS 인증서 수집
//! - [`whois`]: WHOIS 질의

pub mod dns;
pub mod dorks;
pub mod headerhttp;
pub mod nmap;
pub mod ssl;
pub mod whois;

pub use dns::DnsModule;
pub use dorks::DorksModule;
pub use headerhttp::HeaderHttpModule;
pub use nmap::NmapModule;
pub use ssl::SslModule;
pub use whois::WhoisModule;

use tracing::{info, warn};

use centinela_core::config::ModulesConfig;
use centinela_core::error::{ModuleError, RegistryError};
use centinela_core::module::{ModuleRegistry, ModuleRegistryBuilder};
use centinela_core::types::Target;

/// 설정의 `enabled` 순서대로 기본 제공 모듈을 등록한 레지스트리를 만듭니다.
///
/// 알 수 없는 이름은 경고 후 건너뜁니다. 같은 이름이 두 번 나오면 에러입니다.
pub fn default_registry(config: &ModulesConfig) -> Result<ModuleRegistry, RegistryError> {
    let mut builder = ModuleRegistry::builder();
    for name in &config.enabled {
        builder = register_builtin(builder, name, config)?;
    }
    let registry = builder.build();
    let names: Vec<_> = registry.list().into_iter().map(|m| m.name).collect();
    info!(modules = ?names, "module registry built");
    Ok(registry)
}

fn register_builtin(
    builder: ModuleRegistryBuilder,
    name: &str,
    config: &ModulesConfig,
) -> Result<ModuleRegistryBuilder, RegistryError> {
    match name {
        "dns" => builder.register(DnsModule::new(&config.dns)),
        "dorks" => builder.register(DorksModule::new(&config.dorks)),
        "headerhttp" => builder.register(HeaderHttpModule::new(&config.headerhttp)),
        "nmap" => builder.register(NmapModule::new(&config.nmap)),
        "ssl" => builder.register(SslModule::new(&config.ssl)),
        "whois" => builder.register(WhoisModule::new(&config.whois)),
        other => {
            warn!(module = other, "unknown module in modules.enabled, skipping");
            Ok(builder)
        }
    }
}

/// 도메인 대상만 지원하는 모듈의 대상 검사
pub(crate) fn require_domain<'a>(target: &'a Target, module: &str) -> Result<&'a str, ModuleError> {
    if target.is_domain() {
        Ok(target.value())
    } else {
        Err(ModuleError::UnsupportedTarget(format!(
            "{module} requires a domain target, got IP address {target}"
        )))
    }
}
