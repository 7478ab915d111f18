//! nmap 모듈 -- 외부 nmap 프로세스로 포트/서비스 탐지 (heavy 레인)
//!
//! `nmap [-sV] -Pn -T4 -p <ports> -oG - <target>`를 실행하고 greppable 출력을
//! `{"target", "command", "hosts": [{"ip", "hostname", "status", "ports": [...]}]}`로 변환합니다.
//! 실행 제한 시간은 실행기의 heavy 레인 제한 시간이 적용되며,
//! 태스크가 중단되면 자식 프로세스도 종료됩니다.

use std::process::Stdio;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, info};

use centinela_core::config::NmapModuleConfig;
use centinela_core::error::ModuleError;
use centinela_core::module::{ModuleInfo, ResourceClass, ScanModule};
use centinela_core::types::Target;

/// 포트 하나의 탐지 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortEntry {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub service: String,
    pub version: String,
}

/// 호스트 하나의 탐지 결과
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct HostEntry {
    pub ip: String,
    pub hostname: String,
    pub status: String,
    pub ports: Vec<PortEntry>,
}

/// nmap 포트 스캔 모듈
pub struct NmapModule {
    info: ModuleInfo,
    config: NmapModuleConfig,
}

impl NmapModule {
    pub fn new(config: &NmapModuleConfig) -> Self {
        Self {
            info: ModuleInfo::new(
                "nmap",
                "Scans common TCP ports with nmap service detection",
                ResourceClass::Heavy,
            ),
            config: config.clone(),
        }
    }

    fn arguments(&self, target: &Target) -> Vec<String> {
        let mut args = Vec::with_capacity(9);
        if self.config.service_detection {
            args.push("-sV".to_owned());
        }
        args.extend(
            ["-Pn", "-T4", "-p", self.config.ports.as_str(), "-oG", "-"]
                .iter()
                .map(|s| (*s).to_owned()),
        );
        if target.value().contains(':') {
            args.push("-6".to_owned());
        }
        args.push(target.value().to_owned());
        args
    }
}

/// `Host: <ip> (<hostname>)` 접두부를 파싱합니다.
fn parse_host_field(field: &str) -> Option<(String, String)> {
    let rest = field.strip_prefix("Host: ")?;
    let (ip, tail) = rest.split_once(' ').unwrap_or((rest, ""));
    let hostname = tail
        .trim()
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or("")
        .to_owned();
    Some((ip.to_owned(), hostname))
}

/// `22/open/tcp//ssh//OpenSSH 8.9p1/` 형식의 포트 항목을 파싱합니다.
fn parse_port_entry(entry: &str) -> Option<PortEntry> {
    let parts: Vec<&str> = entry.trim().split('/').collect();
    if parts.len() < 7 {
        return None;
    }
    Some(PortEntry {
        port: parts[0].parse().ok()?,
        state: parts[1].to_owned(),
        protocol: parts[2].to_owned(),
        service: parts[4].to_owned(),
        version: parts[6].to_owned(),
    })
}

/// greppable(`-oG`) 출력을 호스트 목록으로 변환합니다.
///
/// 같은 호스트의 `Status:` 줄과 `Ports:` 줄은 하나로 합칩니다.
pub fn parse_greppable(output: &str) -> Vec<HostEntry> {
    let mut hosts: Vec<HostEntry> = Vec::new();

    for line in output.lines().filter(|l| l.starts_with("Host: ")) {
        let mut fields = line.split('\t');
        let Some((ip, hostname)) = fields.next().and_then(parse_host_field) else {
            continue;
        };

        let index = match hosts.iter().position(|h| h.ip == ip) {
            Some(i) => i,
            None => {
                hosts.push(HostEntry {
                    ip,
                    hostname,
                    ..HostEntry::default()
                });
                hosts.len() - 1
            }
        };
        let host = &mut hosts[index];

        for field in fields {
            if let Some(status) = field.strip_prefix("Status: ") {
                host.status = status.trim().to_lowercase();
            } else if let Some(ports) = field.strip_prefix("Ports: ") {
                host.ports.extend(ports.split(", ").filter_map(parse_port_entry));
                if host.status.is_empty() {
                    host.status = "up".to_owned();
                }
            }
        }
    }

    hosts
}

impl ScanModule for NmapModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    async fn execute(&self, target: &Target) -> Result<Value, ModuleError> {
        let args = self.arguments(target);
        debug!(binary = %self.config.binary, args = ?args, "spawning nmap");

        let output = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ModuleError::Unavailable(format!("{} not found in PATH", self.config.binary))
                }
                _ => ModuleError::Process(format!("failed to spawn {}: {e}", self.config.binary)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ModuleError::Process(format!(
                "nmap exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let hosts = parse_greppable(&stdout);
        let open_ports: usize = hosts
            .iter()
            .map(|h| h.ports.iter().filter(|p| p.state == "open").count())
            .sum();
        info!(target = %target, hosts = hosts.len(), open_ports, "nmap finished");

        Ok(json!({
            "target": target.value(),
            "command": format!("{} {}", self.config.binary, args.join(" ")),
            "hosts": hosts,
        }))
    }
}
