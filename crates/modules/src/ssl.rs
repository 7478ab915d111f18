//! ssl 모듈 -- TLS 핸드셰이크로 서버 인증서 수집
//!
//! 인증서 체인과 호스트 이름은 검증하지 않고 인증서 내용만 읽습니다.
//! `native-tls`는 동기 API이므로 `spawn_blocking`에서 연결합니다.

use std::collections::BTreeMap;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use x509_parser::der_parser::oid::Oid;
use x509_parser::objects::{oid_registry, oid2sn};
use x509_parser::prelude::*;

use centinela_core::config::SslModuleConfig;
use centinela_core::error::ModuleError;
use centinela_core::module::{ModuleInfo, ResourceClass, ScanModule};
use centinela_core::types::Target;

/// TLS 인증서 수집 모듈
pub struct SslModule {
    info: ModuleInfo,
    port: u16,
    timeout: Duration,
}

impl SslModule {
    pub fn new(config: &SslModuleConfig) -> Self {
        Self {
            info: ModuleInfo::new(
                "ssl",
                "Retrieves and parses the server TLS certificate",
                ResourceClass::Standard,
            ),
            port: config.port,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

fn io_error(context: &str, e: io::Error) -> ModuleError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            ModuleError::Network(format!("{context}: timed out"))
        }
        _ => ModuleError::Network(format!("{context}: {e}")),
    }
}

/// 서버 인증서를 DER로 가져옵니다.
fn fetch_peer_certificate(
    host: &str,
    port: u16,
    timeout: Duration,
    sni: bool,
) -> Result<Vec<u8>, ModuleError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| io_error("address resolution failed", e))?
        .next()
        .ok_or_else(|| ModuleError::Network(format!("no address found for {host}")))?;

    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| io_error("tcp connect failed", e))?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| io_error("socket setup failed", e))?;

    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .use_sni(sni)
        .build()
        .map_err(|e| ModuleError::Unavailable(format!("tls connector: {e}")))?;

    let tls = connector
        .connect(host, stream)
        .map_err(|e| ModuleError::Network(format!("tls handshake failed: {e}")))?;

    let cert = tls
        .peer_certificate()
        .map_err(|e| ModuleError::Network(format!("peer certificate: {e}")))?
        .ok_or_else(|| ModuleError::Network("server presented no certificate".to_owned()))?;

    cert.to_der()
        .map_err(|e| ModuleError::Parse(format!("certificate DER encoding: {e}")))
}

fn asn1_to_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

fn attr_strings<'a, 'b: 'a>(
    attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> Vec<String> {
    attrs
        .filter_map(|attr| attr.as_str().ok().map(str::to_owned))
        .collect()
}

/// 이름 속성을 `{"CN": [...], "O": [...]}` 형태로 모읍니다.
fn name_to_map(name: &X509Name<'_>) -> BTreeMap<&'static str, Vec<String>> {
    [
        ("CN", attr_strings(name.iter_common_name())),
        ("O", attr_strings(name.iter_organization())),
        ("OU", attr_strings(name.iter_organizational_unit())),
        ("C", attr_strings(name.iter_country())),
        ("ST", attr_strings(name.iter_state_or_province())),
        ("L", attr_strings(name.iter_locality())),
    ]
    .into_iter()
    .filter(|(_, values)| !values.is_empty())
    .collect()
}

/// 서명 알고리즘 OID의 짧은 이름, 레지스트리에 없으면 점 표기 OID
fn signature_algorithm_name(oid: &Oid<'_>) -> String {
    oid2sn(oid, oid_registry())
        .map(str::to_owned)
        .unwrap_or_else(|_| oid.to_id_string())
}

fn to_pem(der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

fn sha256_fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// DER 인증서를 결과 문서로 변환합니다.
pub fn describe_certificate(der: &[u8], now: DateTime<Utc>) -> Result<Value, ModuleError> {
    let (_, cert) = parse_x509_certificate(der)
        .map_err(|e| ModuleError::Parse(format!("x509 certificate: {e}")))?;

    let validity = cert.validity();
    let not_before = asn1_to_utc(&validity.not_before);
    let not_after = asn1_to_utc(&validity.not_after);
    let expired = now > not_after;
    let days_to_expire = if expired {
        0
    } else {
        not_after.signed_duration_since(now).num_days()
    };

    let san: Vec<String> = match cert.subject_alternative_name() {
        Ok(Some(ext)) => ext
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some((*dns).to_owned()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(json!({
        "subject": name_to_map(cert.subject()),
        "issuer": name_to_map(cert.issuer()),
        "subject_dn": cert.subject().to_string(),
        "issuer_dn": cert.issuer().to_string(),
        "not_before": not_before.to_rfc3339(),
        "not_after": not_after.to_rfc3339(),
        "expired": expired,
        "days_to_expire": days_to_expire,
        "serial_number": cert.raw_serial_as_string(),
        "signature_algorithm": signature_algorithm_name(&cert.signature_algorithm.algorithm),
        "san": san,
        "fingerprint_sha256": sha256_fingerprint(der),
        "raw_pem": to_pem(der),
    }))
}

impl ScanModule for SslModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    async fn execute(&self, target: &Target) -> Result<Value, ModuleError> {
        let host = target.value().to_owned();
        let port = self.port;
        let timeout = self.timeout;
        let sni = target.is_domain();

        debug!(host = %host, port, "starting tls handshake");
        let der = tokio::task::spawn_blocking(move || {
            fetch_peer_certificate(&host, port, timeout, sni)
        })
        .await
        .map_err(|e| ModuleError::Process(format!("tls task failed: {e}")))??;

        let mut document = describe_certificate(&der, Utc::now())?;
        if let Some(obj) = document.as_object_mut() {
            obj.insert("host".to_owned(), json!(target.value()));
            obj.insert("port".to_owned(), json!(port));
            obj.insert(
                "meta".to_owned(),
                json!({ "scanned_at": Utc::now().to_rfc3339() }),
            );
        }
        info!(
            host = %target,
            port,
            expired = document["expired"].as_bool().unwrap_or(false),
            "certificate retrieved"
        );
        Ok(document)
    }
}
