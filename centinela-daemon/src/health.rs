//! Aggregated health reporting.
//!
//! The orchestrator periodically probes the status store, the module
//! registry and each worker lane, and produces a [`DaemonHealth`] report.
//! The overall status is the worst component status.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use std::fmt;

use serde::Serialize;

use centinela_core::queue::Lane;

/// Health of a single component or of the whole daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// Health of one daemon component (store, registry, a worker lane).
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status of all components.
    pub status: HealthStatus,
    /// Seconds since the daemon started.
    pub uptime_secs: u64,
    /// Store/queue backend pair, e.g. `sqlite/sqlite`.
    pub backends: &'static str,
    /// Number of registered recon modules.
    pub modules_registered: usize,
    /// Scans currently `running`, when the store answered.
    pub running_scans: Option<usize>,
    pub components: Vec<ComponentHealth>,
}

/// Return the worst status among `components`, joining their reasons.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut degraded = Vec::new();
    let mut unhealthy = Vec::new();

    for component in components {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                degraded.push(format!("{}: {}", component.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                unhealthy.push(format!("{}: {}", component.name, reason));
            }
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}

/// Health of a worker lane from its live and configured worker counts.
pub fn lane_health(lane: Lane, live: usize, configured: usize) -> ComponentHealth {
    let status = if live == configured {
        HealthStatus::Healthy
    } else if live == 0 {
        HealthStatus::Unhealthy("no live workers".to_owned())
    } else {
        HealthStatus::Degraded(format!("{live}/{configured} workers alive"))
    };
    ComponentHealth::new(format!("lane:{lane}"), status)
}

/// Health of the module registry.
pub fn registry_health(modules_registered: usize) -> ComponentHealth {
    let status = if modules_registered == 0 {
        HealthStatus::Degraded("no modules registered".to_owned())
    } else {
        HealthStatus::Healthy
    };
    ComponentHealth::new("registry", status)
}
