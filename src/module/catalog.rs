//! 功能目录
//!
//! 编译期注册表：登记模块、子模块与组件类型的元数据和构造函数，
//! 供注册表、运行器按类型或类型名查询。
//!
//! ```rust
//! use features_core::module::{FeatureCatalog, FeatureDescriptor, Submodule};
//!
//! struct NetFeature;
//! impl FeatureDescriptor for NetFeature {
//!     const MENU_PATH: Option<&'static str> = Some("Net");
//! }
//!
//! #[derive(Default)]
//! struct HttpClient;
//! impl FeatureDescriptor for HttpClient {}
//! impl Submodule for HttpClient {}
//!
//! let mut catalog = FeatureCatalog::new();
//! catalog
//!     .register_module::<NetFeature>()
//!     .register_submodule::<NetFeature, HttpClient>();
//!
//! assert_eq!(catalog.submodules_of(features_core::TypeKey::of::<NetFeature>()).len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::module::component::{Component, SharedComponent};
use crate::module::metadata::{
    short_type_name, FeatureDescriptor, FeatureKind, FeatureMetadata, MetadataProvider, TypeKey,
};
use crate::module::submodule::Submodule;
use crate::utils::{CoreError, Result};

/// 子模块构造函数
pub type SubmoduleFactory = fn() -> Box<dyn Submodule>;

/// 组件构造函数，从设置值反序列化
pub type ComponentFactory = fn(&serde_json::Value) -> Result<SharedComponent>;

/// 功能目录
#[derive(Default, Clone)]
pub struct FeatureCatalog {
    order: Vec<TypeKey>,
    entries: HashMap<TypeKey, FeatureMetadata>,
    names: HashMap<String, TypeKey>,
    submodule_factories: HashMap<TypeKey, SubmoduleFactory>,
    component_factories: HashMap<TypeKey, ComponentFactory>,
}

impl FeatureCatalog {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记模块类型
    pub fn register_module<M: FeatureDescriptor>(&mut self) -> &mut Self {
        self.insert(FeatureMetadata::describe::<M>(FeatureKind::Module));
        self
    }

    /// 登记属于模块 `M` 的子模块类型 `S`
    pub fn register_submodule<M, S>(&mut self) -> &mut Self
    where
        M: FeatureDescriptor,
        S: Submodule + FeatureDescriptor + Default,
    {
        let meta =
            FeatureMetadata::describe::<S>(FeatureKind::Submodule).with_owner(TypeKey::of::<M>());
        let key = meta.key;
        self.insert(meta);
        self.submodule_factories.insert(key, new_submodule::<S>);
        self
    }

    /// 登记组件类型，设置为空时使用 `Default`
    pub fn register_component<C>(&mut self) -> &mut Self
    where
        C: Component + FeatureDescriptor + DeserializeOwned + Default,
    {
        let meta = FeatureMetadata::describe::<C>(FeatureKind::Component);
        let key = meta.key;
        self.insert(meta);
        self.component_factories.insert(key, new_component::<C>);
        self
    }

    /// 直接登记一条元数据，同一类型再次登记时替换旧条目
    pub fn insert(&mut self, metadata: FeatureMetadata) {
        let key = metadata.key;
        if self.entries.insert(key, metadata).is_none() {
            self.order.push(key);
        }

        self.names.insert(key.name().to_string(), key);
        let short = key.short_name().to_string();
        match self.names.get(&short) {
            Some(existing) if *existing != key => {
                warn!(
                    name = %short,
                    existing = existing.name(),
                    "短类型名冲突，只能用完整类型名解析"
                );
            }
            _ => {
                self.names.insert(short, key);
            }
        }
    }

    /// 构造子模块
    pub fn create_submodule(&self, key: TypeKey) -> Option<Box<dyn Submodule>> {
        self.submodule_factories.get(&key).map(|factory| factory())
    }

    /// 构造组件
    pub fn create_component(
        &self,
        key: TypeKey,
        settings: &serde_json::Value,
    ) -> Result<SharedComponent> {
        let factory = self
            .component_factories
            .get(&key)
            .ok_or_else(|| CoreError::ContractViolation {
                expected: "组件",
                type_name: key.name().to_string(),
            })?;
        factory(settings)
    }

    /// 某模块登记的子模块，按登记顺序
    pub fn submodules_of(&self, module: TypeKey) -> Vec<TypeKey> {
        self.order
            .iter()
            .filter(|key| {
                self.entries
                    .get(key)
                    .map(|m| m.kind == FeatureKind::Submodule && m.owner == Some(module))
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }

    /// 全部元数据，按登记顺序
    pub fn entries(&self) -> impl Iterator<Item = &FeatureMetadata> {
        self.order.iter().filter_map(|key| self.entries.get(key))
    }

    /// 指定类别的元数据
    pub fn entries_of(&self, kind: FeatureKind) -> impl Iterator<Item = &FeatureMetadata> {
        self.entries().filter(move |m| m.kind == kind)
    }

    /// 登记的类型数
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 要求 `key` 属于 `kind`，否则返回调用约定错误
    pub fn expect_kind(&self, key: TypeKey, kind: FeatureKind) -> Result<()> {
        match self.kind(key) {
            Some(found) if found == kind => Ok(()),
            Some(_) => Err(CoreError::ContractViolation {
                expected: kind_label(kind),
                type_name: key.name().to_string(),
            }),
            None => Err(CoreError::UnknownType(key.name().to_string())),
        }
    }

    /// 共享
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl std::fmt::Debug for FeatureCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureCatalog")
            .field("types", &self.order)
            .finish()
    }
}

impl MetadataProvider for FeatureCatalog {
    fn metadata(&self, key: TypeKey) -> Option<&FeatureMetadata> {
        self.entries.get(&key)
    }

    fn resolve(&self, type_name: &str) -> Option<TypeKey> {
        self.names
            .get(type_name)
            .or_else(|| self.names.get(short_type_name(type_name)))
            .copied()
    }
}

fn kind_label(kind: FeatureKind) -> &'static str {
    match kind {
        FeatureKind::Module => "模块",
        FeatureKind::Submodule => "子模块",
        FeatureKind::Component => "组件",
    }
}

fn new_submodule<S: Submodule + Default>() -> Box<dyn Submodule> {
    Box::new(S::default())
}

fn new_component<C: Component + DeserializeOwned + Default>(
    settings: &serde_json::Value,
) -> Result<SharedComponent> {
    let component: C = if settings.is_null() {
        C::default()
    } else {
        serde_json::from_value(settings.clone())?
    };
    Ok(Arc::new(component))
}
