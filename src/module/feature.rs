//! 功能模块
//!
//! 模块以具体类型为身份，持有一份子模块类型名的声明式列表，
//! 以及按该列表构造出的子模块实例。列表变化时模块被置脏，
//! 实例在下一次重建时按名称重新构造。

use tracing::{debug, warn};

use crate::core::config::ModuleRecord;
use crate::module::catalog::FeatureCatalog;
use crate::module::metadata::{FeatureKind, MetadataProvider, TypeKey};
use crate::module::submodule::SubmoduleSlot;
use crate::utils::{CoreError, Result};

/// 功能模块
#[derive(Debug)]
pub struct FeatureModule {
    key: TypeKey,
    active: bool,
    submodule_names: Vec<String>,
    submodules: Vec<SubmoduleSlot>,
    dirty: bool,
}

impl FeatureModule {
    /// 以类型标识创建（默认激活，无子模块）
    pub fn new(key: TypeKey) -> Self {
        Self {
            key,
            active: true,
            submodule_names: Vec::new(),
            submodules: Vec::new(),
            dirty: true,
        }
    }

    /// 以具体类型创建
    pub fn of<M: 'static>() -> Self {
        Self::new(TypeKey::of::<M>())
    }

    /// 创建并带上目录中登记的全部子模块
    pub fn with_catalog_defaults(key: TypeKey, catalog: &FeatureCatalog) -> Self {
        let mut module = Self::new(key);
        for sub in catalog.submodules_of(key) {
            module.add_submodule(sub.name());
        }
        module
    }

    /// 从持久化记录创建
    pub fn from_record(record: &ModuleRecord, catalog: &FeatureCatalog) -> Result<Self> {
        let key = catalog
            .resolve(&record.type_name)
            .ok_or_else(|| CoreError::UnknownType(record.type_name.clone()))?;
        catalog.expect_kind(key, FeatureKind::Module)?;

        let mut module = if record.submodules.is_empty() {
            Self::with_catalog_defaults(key, catalog)
        } else {
            let mut module = Self::new(key);
            for name in &record.submodules {
                module.add_submodule(name.clone());
            }
            module
        };
        module.active = record.active;
        Ok(module)
    }

    /// 导出为持久化记录
    pub fn to_record(&self) -> ModuleRecord {
        ModuleRecord {
            type_name: self.key.short_name().to_string(),
            active: self.active,
            submodules: self.submodule_names.clone(),
        }
    }

    /// 追加子模块类型（构建器风格）
    pub fn with_submodule<S: 'static>(mut self) -> Self {
        self.add_submodule(TypeKey::of::<S>().name());
        self
    }

    /// 设置激活状态（构建器风格）
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// 模块类型
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// 是否激活
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 设置激活状态
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    // ==================== 子模块类型列表 ====================

    /// 添加子模块类型名，已存在时返回 false
    pub fn add_submodule(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.has_submodule(&name) {
            return false;
        }
        self.submodule_names.push(name);
        self.dirty = true;
        true
    }

    /// 移除子模块类型名
    pub fn remove_submodule(&mut self, name: &str) -> bool {
        let before = self.submodule_names.len();
        self.submodule_names.retain(|n| n != name);
        let removed = self.submodule_names.len() != before;
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// 是否包含子模块类型名
    pub fn has_submodule(&self, name: &str) -> bool {
        self.submodule_names.iter().any(|n| n == name)
    }

    /// 清空子模块类型列表
    pub fn clear_submodules(&mut self) {
        if !self.submodule_names.is_empty() {
            self.submodule_names.clear();
            self.dirty = true;
        }
    }

    /// 子模块类型名列表
    pub fn submodule_names(&self) -> &[String] {
        &self.submodule_names
    }

    /// 子模块实例是否需要重建
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ==================== 子模块实例 ====================

    /// 按类型名列表重建子模块实例
    ///
    /// 调用方需保证旧实例均已关闭。无法解析或无法构造的类型名被跳过。
    pub fn rebuild_submodules(&mut self, catalog: &FeatureCatalog) -> usize {
        self.submodules.clear();

        for name in &self.submodule_names {
            let Some(key) = catalog.resolve(name) else {
                warn!(module = %self.key, submodule = %name, "子模块类型未登记，已跳过");
                continue;
            };
            if self.submodules.iter().any(|s| s.key() == key) {
                continue;
            }
            match catalog.create_submodule(key) {
                Some(instance) => self.submodules.push(SubmoduleSlot::new(key, instance)),
                None => {
                    warn!(module = %self.key, submodule = %name, "类型不是可构造的子模块，已跳过")
                }
            }
        }

        self.dirty = false;
        debug!(module = %self.key, count = self.submodules.len(), "子模块已重建");
        self.submodules.len()
    }

    /// 直接放入一个子模块实例，不经过目录
    pub fn push_submodule(&mut self, slot: SubmoduleSlot) {
        if !self.has_submodule(slot.key().name()) {
            self.submodule_names.push(slot.key().name().to_string());
        }
        self.submodules.push(slot);
    }

    /// 子模块实例
    pub fn submodules(&self) -> &[SubmoduleSlot] {
        &self.submodules
    }

    /// 子模块实例（可变）
    pub fn submodules_mut(&mut self) -> &mut [SubmoduleSlot] {
        &mut self.submodules
    }

    /// 按下标取子模块
    pub fn submodule(&self, index: usize) -> Option<&SubmoduleSlot> {
        self.submodules.get(index)
    }

    /// 按下标取子模块（可变）
    pub fn submodule_mut(&mut self, index: usize) -> Option<&mut SubmoduleSlot> {
        self.submodules.get_mut(index)
    }

    /// 查找某类型子模块的下标
    pub fn find_submodule(&self, key: TypeKey) -> Option<usize> {
        self.submodules.iter().position(|s| s.key() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::FeatureDescriptor;
    use crate::module::submodule::Submodule;

    struct Input;
    impl FeatureDescriptor for Input {}

    #[derive(Default)]
    struct Keyboard;
    impl FeatureDescriptor for Keyboard {}
    impl Submodule for Keyboard {}

    #[derive(Default)]
    struct Gamepad;
    impl FeatureDescriptor for Gamepad {}
    impl Submodule for Gamepad {}

    fn catalog() -> FeatureCatalog {
        let mut catalog = FeatureCatalog::new();
        catalog
            .register_module::<Input>()
            .register_submodule::<Input, Keyboard>()
            .register_submodule::<Input, Gamepad>();
        catalog
    }

    #[test]
    fn test_submodule_list_crud_marks_dirty() {
        let catalog = catalog();
        let mut module = FeatureModule::of::<Input>();
        assert!(module.add_submodule("Keyboard"));
        assert!(!module.add_submodule("Keyboard"));
        assert_eq!(module.rebuild_submodules(&catalog), 1);
        assert!(!module.is_dirty());

        assert!(module.remove_submodule("Keyboard"));
        assert!(module.is_dirty());
        assert!(!module.remove_submodule("Keyboard"));

        module.add_submodule("Gamepad");
        module.clear_submodules();
        assert!(module.submodule_names().is_empty());
    }

    #[test]
    fn test_rebuild_skips_unknown_names() {
        let catalog = catalog();
        let mut module = FeatureModule::of::<Input>()
            .with_submodule::<Gamepad>()
            .with_submodule::<String>();
        module.add_submodule("Touch");

        assert_eq!(module.rebuild_submodules(&catalog), 1);
        assert_eq!(module.submodules()[0].key(), TypeKey::of::<Gamepad>());
        assert_eq!(module.find_submodule(TypeKey::of::<Gamepad>()), Some(0));
    }

    #[test]
    fn test_from_record_uses_catalog_defaults() {
        let catalog = catalog();
        let record = ModuleRecord {
            type_name: "Input".into(),
            active: false,
            submodules: Vec::new(),
        };
        let mut module = FeatureModule::from_record(&record, &catalog).unwrap();
        assert!(!module.is_active());
        assert_eq!(module.rebuild_submodules(&catalog), 2);
        assert_eq!(module.to_record().type_name, "Input");

        let record = ModuleRecord {
            type_name: "Keyboard".into(),
            active: true,
            submodules: Vec::new(),
        };
        assert!(matches!(
            FeatureModule::from_record(&record, &catalog),
            Err(CoreError::ContractViolation { .. })
        ));
    }
}
