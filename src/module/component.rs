//! 组件与组件列表
//!
//! 组件是子模块绑定的外部只读资源（通常是一份配置数据），以
//! `Arc<dyn Component>` 共享。[`ComponentProfile`] 是组件的持久化列表，
//! 任何修改都会置脏，运行器在下一帧据此完整重建。

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::config::ComponentRecord;
use crate::module::catalog::FeatureCatalog;
use crate::module::metadata::{MetadataProvider, TypeKey};
use crate::utils::{CoreError, Result};

/// 组件的类型擦除辅助
pub trait ComponentAny: Any + Send + Sync {
    /// 以 `&dyn Any` 访问
    fn component_any(&self) -> &dyn Any;
    /// 转为 `Arc<dyn Any>`，用于向下转型
    fn into_component_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> ComponentAny for T {
    fn component_any(&self) -> &dyn Any {
        self
    }

    fn into_component_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// 组件
pub trait Component: ComponentAny {}

/// 共享的组件实例
pub type SharedComponent = Arc<dyn Component>;

/// 引用转型
pub fn downcast_component<C: Component>(component: &SharedComponent) -> Option<&C> {
    component.as_ref().component_any().downcast_ref::<C>()
}

/// 共享指针转型
pub fn downcast_component_arc<C: Component>(component: SharedComponent) -> Option<Arc<C>> {
    component.into_component_any().downcast::<C>().ok()
}

// ============================================================================
// 组件槽
// ============================================================================

/// 子模块内持有特定类型组件的槽位
pub struct ComponentSlot<C: Component> {
    bound: Option<SharedComponent>,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Component> ComponentSlot<C> {
    /// 创建空槽
    pub fn new() -> Self {
        Self {
            bound: None,
            _marker: PhantomData,
        }
    }

    /// 槽位要求的组件类型
    pub fn component_type(&self) -> TypeKey {
        TypeKey::of::<C>()
    }

    /// 绑定组件，类型不符时拒绝
    pub fn bind(&mut self, component: SharedComponent) -> bool {
        if downcast_component::<C>(&component).is_none() {
            warn!(
                expected = %TypeKey::of::<C>(),
                "组件类型不匹配，拒绝绑定"
            );
            return false;
        }
        self.bound = Some(component);
        true
    }

    /// 已绑定的组件
    pub fn get(&self) -> Option<&C> {
        self.bound.as_ref().and_then(downcast_component::<C>)
    }

    /// 已绑定的共享实例
    pub fn shared(&self) -> Option<&SharedComponent> {
        self.bound.as_ref()
    }

    /// 解除绑定
    pub fn clear(&mut self) {
        self.bound = None;
    }
}

impl<C: Component> Default for ComponentSlot<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Component> fmt::Debug for ComponentSlot<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSlot")
            .field("type", &TypeKey::of::<C>())
            .field("bound", &self.bound.is_some())
            .finish()
    }
}

// ============================================================================
// 组件列表
// ============================================================================

/// 组件列表
#[derive(Default)]
pub struct ComponentProfile {
    entries: Vec<(TypeKey, SharedComponent)>,
    dirty: bool,
    revision: u64,
}

impl ComponentProfile {
    /// 创建空列表
    pub fn new() -> Self {
        Self::default()
    }

    /// 从持久化记录构建
    pub fn from_records(catalog: &FeatureCatalog, records: &[ComponentRecord]) -> Result<Self> {
        let mut profile = Self::new();
        for record in records {
            let key = catalog
                .resolve(&record.type_name)
                .ok_or_else(|| CoreError::UnknownType(record.type_name.clone()))?;
            let component = catalog.create_component(key, &record.settings)?;
            profile.insert(key, component, false)?;
        }
        profile.dirty = false;
        Ok(profile)
    }

    /// 添加组件
    pub fn add<C: Component>(&mut self, component: C) -> Result<()> {
        self.insert(TypeKey::of::<C>(), Arc::new(component), false)
    }

    /// 按类型插入；已存在且不覆盖时返回 `ComponentAlreadyRegistered`
    pub fn insert(
        &mut self,
        key: TypeKey,
        component: SharedComponent,
        overrides: bool,
    ) -> Result<()> {
        match self.position(key) {
            Some(index) if overrides => {
                self.entries[index].1 = component;
            }
            Some(_) => return Err(CoreError::ComponentAlreadyRegistered(key.to_string())),
            None => self.entries.push((key, component)),
        }
        debug!(component = %key, "组件已加入列表");
        self.touch();
        Ok(())
    }

    /// 移除组件
    pub fn remove(&mut self, key: TypeKey) -> Option<SharedComponent> {
        let index = self.position(key)?;
        let (_, component) = self.entries.remove(index);
        self.touch();
        Some(component)
    }

    /// 是否包含
    pub fn has(&self, key: TypeKey) -> bool {
        self.position(key).is_some()
    }

    /// 查询
    pub fn get(&self, key: TypeKey) -> Option<&SharedComponent> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, c)| c)
    }

    /// 按具体类型查询
    pub fn get_as<C: Component>(&self) -> Option<Arc<C>> {
        self.get(TypeKey::of::<C>())
            .cloned()
            .and_then(downcast_component_arc::<C>)
    }

    /// 条目类型，按加入顺序
    pub fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    /// 数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 是否被修改过
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 清除脏标记
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// 修改计数，每次增删加一
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn position(&self, key: TypeKey) -> Option<usize> {
        self.entries.iter().position(|(k, _)| *k == key)
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }
}

impl fmt::Debug for ComponentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentProfile")
            .field("components", &self.keys().collect::<Vec<_>>())
            .field("dirty", &self.dirty)
            .finish()
    }
}
