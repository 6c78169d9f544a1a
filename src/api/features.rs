//! 访问门面
//!
//! 为外部调用方提供"查找某类型的可用子模块 / 组件"的入口。查询结果按类型
//! 惰性缓存，运行器报告模块加入、移除或整体重建时整体失效；组件列表的
//! 修改计数变化时组件缓存同样失效。
//!
//! ```rust
//! use std::time::Duration;
//! use features_core::api::Features;
//! use features_core::builtin::{self, SimpleTimer};
//!
//! let catalog = builtin::catalog().into_shared();
//! let mut features = Features::with_catalog_defaults(catalog).unwrap();
//! features.enable();
//! features.update_with_delta(Duration::from_millis(16));
//!
//! let timers = features
//!     .call_submodule_method(|timer: &mut SimpleTimer| timer.len())
//!     .unwrap();
//! assert_eq!(timers, 0);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::core::config::CoreConfig;
use crate::module::{
    downcast_component_arc, Component, ComponentProfile, FeatureCatalog, FeatureKind,
    FeatureModule, MetadataProvider, ModuleEvent, ModuleProfile, Runner, SharedComponent,
    Submodule, SubmoduleRef, TypeKey,
};
use crate::utils::{CoreError, Result, SubscriptionId};

/// 访问门面
pub struct Features {
    runner: Runner,
    submodule_cache: HashMap<TypeKey, SubmoduleRef>,
    component_cache: HashMap<TypeKey, SharedComponent>,
    invalidated: Arc<AtomicBool>,
    subscription: SubscriptionId,
    component_revision: u64,
}

impl fmt::Debug for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Features")
            .field("runner", &self.runner)
            .field("cached_submodules", &self.submodule_cache.len())
            .field("cached_components", &self.component_cache.keys().collect::<Vec<_>>())
            .field("subscription", &self.subscription)
            .finish()
    }
}

impl Features {
    /// 包装运行器并订阅其模块变更
    pub fn new(mut runner: Runner) -> Self {
        let invalidated = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invalidated);
        let subscription = runner.subscribe(Arc::new(move |event: &ModuleEvent| {
            trace!(event = %event, "查询缓存失效");
            flag.store(true, Ordering::Release);
        }));
        let component_revision = runner.components().revision();

        Self {
            runner,
            submodule_cache: HashMap::new(),
            component_cache: HashMap::new(),
            invalidated,
            subscription,
            component_revision,
        }
    }

    /// 从完整配置构建
    pub fn from_config(catalog: Arc<FeatureCatalog>, config: &CoreConfig) -> Result<Self> {
        Runner::from_config(catalog, config).map(Self::new)
    }

    /// 目录中登记的每个模块都以默认子模块加入注册表
    pub fn with_catalog_defaults(catalog: Arc<FeatureCatalog>) -> Result<Self> {
        let mut modules = ModuleProfile::new(Arc::clone(&catalog));
        for meta in catalog.entries_of(FeatureKind::Module) {
            modules.add(FeatureModule::with_catalog_defaults(meta.key, &catalog), false)?;
        }
        Ok(Self::new(Runner::new(modules, ComponentProfile::new())))
    }

    // ==================== 子模块查询 ====================

    /// 查找某类型的可用子模块
    pub fn get_submodule<T: Submodule>(&mut self) -> Option<&mut T> {
        let r = self.lookup_submodule(TypeKey::of::<T>())?;
        self.runner.submodule_mut(r)?.downcast_mut::<T>()
    }

    /// 按类型标识查找子模块；类型不是子模块时返回调用约定错误
    pub fn get_submodule_by_key(&mut self, key: TypeKey) -> Result<Option<&mut dyn Submodule>> {
        self.require_kind(key, FeatureKind::Submodule)?;
        let Some(r) = self.lookup_submodule(key) else {
            return Ok(None);
        };
        Ok(self.runner.submodule_mut(r).map(|slot| slot.submodule_mut()))
    }

    /// 按类型名查找子模块
    pub fn get_submodule_by_name(&mut self, type_name: &str) -> Result<Option<&mut dyn Submodule>> {
        let key = self
            .runner
            .modules()
            .catalog()
            .resolve(type_name)
            .ok_or_else(|| CoreError::UnknownType(type_name.to_string()))?;
        self.get_submodule_by_key(key)
    }

    /// 在可用的子模块上执行操作；没有可用实例时返回 `SubmoduleNotFound`
    pub fn call_submodule_method<T, R, F>(&mut self, f: F) -> Result<R>
    where
        T: Submodule,
        F: FnOnce(&mut T) -> R,
    {
        self.get_submodule::<T>()
            .map(f)
            .ok_or_else(|| CoreError::SubmoduleNotFound(TypeKey::of::<T>().to_string()))
    }

    /// 按类型名在可用的子模块上执行操作
    pub fn call_submodule_by_name<R, F>(&mut self, type_name: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut dyn Submodule) -> R,
    {
        self.get_submodule_by_name(type_name)?
            .map(f)
            .ok_or_else(|| CoreError::SubmoduleNotFound(type_name.to_string()))
    }

    fn lookup_submodule(&mut self, key: TypeKey) -> Option<SubmoduleRef> {
        self.sync_caches();

        if let Some(r) = self.submodule_cache.get(&key).copied() {
            let valid = self.runner.is_available(r)
                && self.runner.submodule(r).map(|s| s.key()) == Some(key);
            if valid {
                return Some(r);
            }
            self.submodule_cache.remove(&key);
        }

        let r = self.runner.find_submodule(key)?;
        self.submodule_cache.insert(key, r);
        Some(r)
    }

    // ==================== 组件查询 ====================

    /// 查找某类型的组件
    pub fn get_component<T: Component>(&mut self) -> Option<Arc<T>> {
        self.lookup_component(TypeKey::of::<T>())
            .and_then(downcast_component_arc::<T>)
    }

    /// 按类型标识查找组件；类型不是组件时返回调用约定错误
    pub fn try_get_component(&mut self, key: TypeKey) -> Result<Option<SharedComponent>> {
        self.require_kind(key, FeatureKind::Component)?;
        Ok(self.lookup_component(key))
    }

    fn lookup_component(&mut self, key: TypeKey) -> Option<SharedComponent> {
        self.sync_caches();

        if let Some(component) = self.component_cache.get(&key) {
            return Some(Arc::clone(component));
        }
        let component = Arc::clone(self.runner.components().get(key)?);
        self.component_cache.insert(key, Arc::clone(&component));
        Some(component)
    }

    /// 目录登记为其他类别时报错；目录未登记且运行器中也不存在时报未知类型
    fn require_kind(&self, key: TypeKey, kind: FeatureKind) -> Result<()> {
        let catalog = self.runner.modules().catalog();
        if catalog.kind(key).is_some() {
            return catalog.expect_kind(key, kind);
        }

        let known = match kind {
            FeatureKind::Component => self.runner.components().has(key),
            _ => self.runner.find_submodule(key).is_some(),
        };
        if known {
            Ok(())
        } else {
            Err(CoreError::UnknownType(key.name().to_string()))
        }
    }

    fn sync_caches(&mut self) {
        let revision = self.runner.components().revision();
        if self.invalidated.swap(false, Ordering::AcqRel) || revision != self.component_revision {
            debug!(
                submodules = self.submodule_cache.len(),
                components = self.component_cache.len(),
                "清空查询缓存"
            );
            self.submodule_cache.clear();
            self.component_cache.clear();
            self.component_revision = revision;
        }
    }

    /// 当前缓存条目数（子模块，组件）
    pub fn cached_entries(&self) -> (usize, usize) {
        (self.submodule_cache.len(), self.component_cache.len())
    }

    // ==================== 运行器委托 ====================

    /// 启用运行器
    pub fn enable(&mut self) {
        self.runner.enable();
    }

    /// 推进一帧
    pub fn update(&mut self) {
        self.runner.update();
    }

    /// 以给定时间推进一帧
    pub fn update_with_delta(&mut self, delta: Duration) {
        self.runner.update_with_delta(delta);
    }

    /// 停用运行器
    pub fn disable(&mut self) {
        self.runner.disable();
    }

    /// GUI 绘制
    pub fn draw_gui(&mut self) {
        self.runner.draw_gui();
    }

    /// 调试图形绘制
    pub fn draw_gizmos(&mut self) {
        self.runner.draw_gizmos();
    }

    /// 请求加入模块
    pub fn add_module(&mut self, menu_path: &str) -> bool {
        self.runner.add_module(menu_path)
    }

    /// 请求移除模块
    pub fn remove_module(&mut self, menu_path: &str) -> bool {
        self.runner.remove_module(menu_path)
    }

    /// 模块是否在运行且激活
    pub fn get_module_active(&self, menu_path: &str) -> bool {
        self.runner.get_module_active(menu_path)
    }

    /// 请求设置模块激活状态
    pub fn set_module_active(&mut self, menu_path: &str, active: bool) -> bool {
        self.runner.set_module_active(menu_path, active)
    }

    /// 运行器
    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// 运行器（可变）
    pub fn runner_mut(&mut self) -> &mut Runner {
        &mut self.runner
    }

    /// 取消订阅并取回运行器
    pub fn into_runner(mut self) -> Runner {
        self.runner.unsubscribe(&self.subscription);
        self.runner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::FeatureDescriptor;

    struct Audio;
    impl FeatureDescriptor for Audio {
        const MENU_PATH: Option<&'static str> = Some("Audio");
    }

    #[derive(Default)]
    struct Mixer {
        channels: u8,
    }
    impl FeatureDescriptor for Mixer {}
    impl Submodule for Mixer {}

    #[derive(Debug, Default, serde::Deserialize)]
    struct Volume {
        level: u8,
    }
    impl FeatureDescriptor for Volume {}
    impl Component for Volume {}

    fn features() -> Features {
        let mut catalog = FeatureCatalog::new();
        catalog
            .register_module::<Audio>()
            .register_submodule::<Audio, Mixer>()
            .register_component::<Volume>();
        let mut features = Features::with_catalog_defaults(catalog.into_shared()).unwrap();
        features
            .runner_mut()
            .components_mut()
            .add(Volume { level: 3 })
            .unwrap();
        features
    }

    #[test]
    fn test_lookup_before_enable_finds_nothing() {
        let mut features = features();
        assert!(features.get_submodule::<Mixer>().is_none());
        assert!(matches!(
            features.call_submodule_method(|m: &mut Mixer| m.channels),
            Err(CoreError::SubmoduleNotFound(_))
        ));
    }

    #[test]
    fn test_submodule_lookup_is_cached() {
        let mut features = features();
        features.enable();

        features.get_submodule::<Mixer>().unwrap().channels = 2;
        assert_eq!(features.cached_entries().0, 1);
        assert_eq!(
            features.call_submodule_method(|m: &mut Mixer| m.channels).unwrap(),
            2
        );
    }

    #[test]
    fn test_kind_mismatch_is_contract_violation() {
        let mut features = features();
        features.enable();

        assert!(matches!(
            features.get_submodule_by_key(TypeKey::of::<Volume>()),
            Err(CoreError::ContractViolation { .. })
        ));
        assert!(matches!(
            features.try_get_component(TypeKey::of::<Mixer>()),
            Err(CoreError::ContractViolation { .. })
        ));
        assert!(matches!(
            features.try_get_component(TypeKey::of::<String>()),
            Err(CoreError::UnknownType(_))
        ));
        assert!(matches!(
            features.get_submodule_by_name("Nope"),
            Err(CoreError::UnknownType(_))
        ));
    }

    #[test]
    fn test_component_cache_follows_revision() {
        let mut features = features();
        assert_eq!(features.get_component::<Volume>().unwrap().level, 3);

        features
            .runner_mut()
            .components_mut()
            .insert(TypeKey::of::<Volume>(), Arc::new(Volume { level: 8 }), true)
            .unwrap();
        assert_eq!(features.get_component::<Volume>().unwrap().level, 8);
    }
}
