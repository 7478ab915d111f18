//! 정찰 모듈 계약과 모듈 레지스트리
//!
//! 모든 정찰 모듈은 [`ScanModule`]을 구현합니다.
//! 입력은 검증된 [`Target`] 하나, 출력은 JSON 문서 또는 [`ModuleError`]입니다.
//! 모듈은 상태 저장소에 접근하지 않습니다.
//!
//! [`ModuleRegistry`]는 [`ModuleRegistryBuilder`]로 프로세스 시작 시 한 번 구성되며,
//! 구성 이후에는 변경 연산을 제공하지 않습니다.
//!
//! # 사용 예시
//! ```ignore
//! let registry = ModuleRegistry::builder()
//!     .register(DnsModule::new(&config.modules.dns))?
//!     .register(NmapModule::new(&config.modules.nmap))?
//!     .build();
//!
//! let module = registry.resolve("dns")?;
//! let result = module.execute(&target).await;
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ModuleError, RegistryError, SubmissionError};
use crate::types::Target;

/// `dyn` 호환 trait에서 사용하는 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ─── ResourceClass ──────────────────────────────────────────────────

/// 모듈 자원 등급
///
/// `Heavy` 모듈은 별도의 `heavy` 레인에서 실행되어
/// 일반 모듈의 처리량을 잠식하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    #[default]
    Standard,
    Heavy,
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Heavy => write!(f, "heavy"),
        }
    }
}

// ─── ModuleInfo ─────────────────────────────────────────────────────

/// 모듈 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// 모듈 고유 이름 (예: `"dns"`)
    pub name: String,
    /// 모듈 설명
    pub description: String,
    /// 자원 등급
    pub resource_class: ResourceClass,
}

impl ModuleInfo {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        resource_class: ResourceClass,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            resource_class,
        }
    }
}

// ─── ScanModule Trait ───────────────────────────────────────────────

/// 정찰 모듈 계약
///
/// `execute`는 성공 시 JSON 직렬화 가능한 결과 문서를 반환합니다.
/// 패닉은 실행기가 격리하여 `error` 결과로 기록합니다.
///
/// # 구현 예시
/// ```ignore
/// struct EchoModule { info: ModuleInfo }
///
/// impl ScanModule for EchoModule {
///     fn info(&self) -> &ModuleInfo { &self.info }
///
///     async fn execute(&self, target: &Target) -> Result<Value, ModuleError> {
///         Ok(json!({ "target": target.value() }))
///     }
/// }
/// ```
pub trait ScanModule: Send + Sync + 'static {
    /// 모듈 메타데이터를 반환합니다.
    fn info(&self) -> &ModuleInfo;

    /// 대상 하나에 대해 모듈을 실행합니다.
    fn execute(
        &self,
        target: &Target,
    ) -> impl Future<Output = Result<serde_json::Value, ModuleError>> + Send;
}

// ─── DynScanModule Trait ────────────────────────────────────────────

/// dyn-compatible 모듈 trait
///
/// `ScanModule`은 RPITIT를 사용하므로 `dyn ScanModule`이 불가합니다.
/// `DynScanModule`은 `BoxFuture`를 반환하여 레지스트리에서
/// `Arc<dyn DynScanModule>`로 모듈을 보관할 수 있게 합니다.
pub trait DynScanModule: Send + Sync + 'static {
    /// 모듈 메타데이터를 반환합니다.
    fn info(&self) -> &ModuleInfo;

    /// 대상 하나에 대해 모듈을 실행합니다.
    fn execute<'a>(
        &'a self,
        target: &'a Target,
    ) -> BoxFuture<'a, Result<serde_json::Value, ModuleError>>;
}

/// ScanModule을 구현한 타입은 자동으로 DynScanModule도 구현됩니다.
impl<T: ScanModule> DynScanModule for T {
    fn info(&self) -> &ModuleInfo {
        ScanModule::info(self)
    }

    fn execute<'a>(
        &'a self,
        target: &'a Target,
    ) -> BoxFuture<'a, Result<serde_json::Value, ModuleError>> {
        Box::pin(ScanModule::execute(self, target))
    }
}

// ─── ModuleRegistry ─────────────────────────────────────────────────

/// 불변 모듈 레지스트리
///
/// 등록 순서가 보존됩니다. 복제 비용이 낮아(`Arc`) 여러 워커가 공유합니다.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: Arc<Vec<Arc<dyn DynScanModule>>>,
}

impl ModuleRegistry {
    /// 새 빌더를 생성합니다.
    pub fn builder() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder::default()
    }

    /// 이름으로 모듈을 조회합니다.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DynScanModule>, SubmissionError> {
        self.modules
            .iter()
            .find(|m| m.info().name == name)
            .cloned()
            .ok_or_else(|| SubmissionError::UnknownModule {
                name: name.to_owned(),
            })
    }

    /// 이름이 등록되어 있으면 `true`
    pub fn contains(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.info().name == name)
    }

    /// 등록된 모듈의 메타데이터 목록 (등록 순서)
    pub fn list(&self) -> Vec<ModuleInfo> {
        self.modules.iter().map(|m| m.info().clone()).collect()
    }

    /// 등록된 모듈 수
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// 비어 있으면 `true`
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.modules.iter().map(|m| m.info().name.clone()).collect();
        f.debug_struct("ModuleRegistry")
            .field("modules", &names)
            .finish()
    }
}

/// [`ModuleRegistry`] 빌더
#[derive(Default)]
pub struct ModuleRegistryBuilder {
    modules: Vec<Arc<dyn DynScanModule>>,
}

impl ModuleRegistryBuilder {
    /// 모듈을 등록합니다.
    ///
    /// 같은 이름이 이미 있거나 이름이 비어 있으면 에러를 반환합니다.
    pub fn register<M: ScanModule>(self, module: M) -> Result<Self, RegistryError> {
        self.register_arc(Arc::new(module))
    }

    /// 이미 `Arc`로 감싼 모듈을 등록합니다.
    pub fn register_arc(mut self, module: Arc<dyn DynScanModule>) -> Result<Self, RegistryError> {
        let name = module.info().name.clone();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.modules.iter().any(|m| m.info().name == name) {
            return Err(RegistryError::AlreadyRegistered { name });
        }
        self.modules.push(module);
        Ok(self)
    }

    /// 불변 레지스트리를 생성합니다.
    pub fn build(self) -> ModuleRegistry {
        ModuleRegistry {
            modules: Arc::new(self.modules),
        }
    }
}
