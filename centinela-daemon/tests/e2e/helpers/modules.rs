//! Mock recon modules.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use centinela_core::error::ModuleError;
use centinela_core::module::{ModuleInfo, ModuleRegistry, ResourceClass, ScanModule};
use centinela_core::types::Target;
use serde_json::{Value, json};

/// What a mock module does when executed.
#[derive(Clone, Copy)]
#[allow(dead_code)]
pub enum Behaviour {
    Succeed,
    Fail,
    Panic,
    Sleep(Duration),
}

pub struct MockModule {
    info: ModuleInfo,
    behaviour: Behaviour,
    calls: Arc<AtomicUsize>,
}

impl MockModule {
    pub fn new(name: &str, class: ResourceClass, behaviour: Behaviour) -> Self {
        Self {
            info: ModuleInfo::new(name, format!("mock {name}"), class),
            behaviour,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl ScanModule for MockModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    async fn execute(&self, target: &Target) -> Result<Value, ModuleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Succeed => Ok(json!({ "module": self.info.name, "target": target.value() })),
            Behaviour::Fail => Err(ModuleError::Network("connection refused".to_owned())),
            Behaviour::Panic => panic!("mock module {} panicked", self.info.name),
            Behaviour::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(json!({ "slept_ms": duration.as_millis() as u64 }))
            }
        }
    }
}

/// Call counters of the standard mock registry, keyed by module.
#[allow(dead_code)]
pub struct Calls {
    pub dns: Arc<AtomicUsize>,
    pub nmap: Arc<AtomicUsize>,
}

/// `dns` and `ssl` succeed, `whois` fails, `nmap` (heavy) succeeds.
pub fn standard_registry() -> (ModuleRegistry, Calls) {
    let dns = MockModule::new("dns", ResourceClass::Standard, Behaviour::Succeed);
    let nmap = MockModule::new("nmap", ResourceClass::Heavy, Behaviour::Succeed);
    let calls = Calls {
        dns: dns.calls(),
        nmap: nmap.calls(),
    };
    let registry = ModuleRegistry::builder()
        .register(dns)
        .and_then(|b| {
            b.register(MockModule::new("ssl", ResourceClass::Standard, Behaviour::Succeed))
        })
        .and_then(|b| {
            b.register(MockModule::new("whois", ResourceClass::Standard, Behaviour::Fail))
        })
        .and_then(|b| b.register(nmap))
        .expect("mock registry should build")
        .build();
    (registry, calls)
}

/// Registry with one module per failure mode next to a healthy sibling.
#[allow(dead_code)]
pub fn faulty_registry() -> ModuleRegistry {
    ModuleRegistry::builder()
        .register(MockModule::new("healthy", ResourceClass::Standard, Behaviour::Succeed))
        .and_then(|b| {
            b.register(MockModule::new("failing", ResourceClass::Standard, Behaviour::Fail))
        })
        .and_then(|b| {
            b.register(MockModule::new("panicking", ResourceClass::Standard, Behaviour::Panic))
        })
        .and_then(|b| {
            b.register(MockModule::new(
                "stuck",
                ResourceClass::Heavy,
                Behaviour::Sleep(Duration::from_secs(60)),
            ))
        })
        .expect("faulty registry should build")
        .build()
}
