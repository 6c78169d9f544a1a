//! 功能类型元数据
//!
//! 模块、子模块与组件通过 [`FeatureDescriptor`] 声明菜单路径、依赖与描述。
//! 注册表和运行器只通过 [`MetadataProvider`] 按类型读取这些信息，从不修改。

use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

// ============================================================================
// 类型标识
// ============================================================================

/// 类型标识
///
/// 以 `TypeId` 判等与哈希，同时保留类型名用于日志、配置记录与报错。
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// 取得类型 `T` 的标识
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// 完整类型名
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 短类型名（最后一段路径）
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }

    /// 底层 `TypeId`
    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

/// 截取类型名的最后一段路径，泛型参数保留原样
pub fn short_type_name(name: &str) -> &str {
    let base = name.split('<').next().unwrap_or(name);
    match base.rfind("::") {
        Some(pos) => &name[pos + 2..],
        None => name,
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for TypeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(other.name).then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.short_name())
    }
}

// ============================================================================
// 元数据
// ============================================================================

/// 功能类型类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// 模块
    Module,
    /// 子模块
    Submodule,
    /// 组件
    Component,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::Module => "模块",
            FeatureKind::Submodule => "子模块",
            FeatureKind::Component => "组件",
        };
        f.write_str(name)
    }
}

/// 工具层选择子模块时的约束
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// 可同时选择多个
    #[default]
    Multiple,
    /// 同一模块内只能选一个
    Single,
    /// 锁定，不允许取消
    Locked,
}

/// 类型自带的声明信息
///
/// ```rust
/// use features_core::module::{FeatureDescriptor, TypeKey};
///
/// struct CoreFeature;
/// impl FeatureDescriptor for CoreFeature {}
///
/// struct AudioFeature;
/// impl FeatureDescriptor for AudioFeature {
///     const MENU_PATH: Option<&'static str> = Some("Audio");
///     fn dependencies() -> Vec<TypeKey> {
///         vec![TypeKey::of::<CoreFeature>()]
///     }
/// }
/// ```
pub trait FeatureDescriptor: 'static {
    /// 菜单路径
    const MENU_PATH: Option<&'static str> = None;
    /// 描述
    const DESCRIPTION: Option<&'static str> = None;
    /// 选择约束
    const SELECTION_MODE: SelectionMode = SelectionMode::Multiple;

    /// 依赖的模块类型，按声明顺序
    fn dependencies() -> Vec<TypeKey> {
        Vec::new()
    }
}

/// 某个类型的元数据
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMetadata {
    /// 类型标识
    pub key: TypeKey,
    /// 类别
    pub kind: FeatureKind,
    /// 菜单路径
    pub menu_path: Option<String>,
    /// 依赖的模块类型（有序、去重）
    pub dependencies: Vec<TypeKey>,
    /// 描述
    pub description: Option<String>,
    /// 选择约束
    pub selection_mode: SelectionMode,
    /// 子模块所属的模块类型
    pub owner: Option<TypeKey>,
}

impl FeatureMetadata {
    /// 创建一条空白元数据
    pub fn new(key: TypeKey, kind: FeatureKind) -> Self {
        Self {
            key,
            kind,
            menu_path: None,
            dependencies: Vec::new(),
            description: None,
            selection_mode: SelectionMode::Multiple,
            owner: None,
        }
    }

    /// 从类型声明读取
    pub fn describe<T: FeatureDescriptor>(kind: FeatureKind) -> Self {
        let mut meta = Self::new(TypeKey::of::<T>(), kind);
        meta.menu_path = T::MENU_PATH.map(str::to_string);
        meta.description = T::DESCRIPTION.map(str::to_string);
        meta.selection_mode = T::SELECTION_MODE;
        for dep in T::dependencies() {
            meta = meta.with_dependency(dep);
        }
        meta
    }

    /// 设置菜单路径
    pub fn with_menu_path(mut self, path: impl Into<String>) -> Self {
        self.menu_path = Some(path.into());
        self
    }

    /// 追加依赖（重复的依赖被忽略）
    pub fn with_dependency(mut self, dep: TypeKey) -> Self {
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// 设置描述
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 设置所属模块
    pub fn with_owner(mut self, owner: TypeKey) -> Self {
        self.owner = Some(owner);
        self
    }
}

// ============================================================================
// 元数据提供者
// ============================================================================

/// 只读的元数据查询接口
pub trait MetadataProvider {
    /// 查询某类型的元数据
    fn metadata(&self, key: TypeKey) -> Option<&FeatureMetadata>;

    /// 按类型名（完整名或短名）解析类型
    fn resolve(&self, type_name: &str) -> Option<TypeKey>;

    /// 声明的依赖列表，未声明时为空
    fn dependencies(&self, key: TypeKey) -> &[TypeKey] {
        self.metadata(key)
            .map(|m| m.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// 声明的菜单路径
    fn menu_path(&self, key: TypeKey) -> Option<&str> {
        self.metadata(key).and_then(|m| m.menu_path.as_deref())
    }

    /// 类型类别
    fn kind(&self, key: TypeKey) -> Option<FeatureKind> {
        self.metadata(key).map(|m| m.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base;
    impl FeatureDescriptor for Base {}

    struct Audio;
    impl FeatureDescriptor for Audio {
        const MENU_PATH: Option<&'static str> = Some("Media/Audio");
        const DESCRIPTION: Option<&'static str> = Some("音频");
        fn dependencies() -> Vec<TypeKey> {
            vec![TypeKey::of::<Base>(), TypeKey::of::<Base>()]
        }
    }

    #[test]
    fn test_type_key_identity() {
        assert_eq!(TypeKey::of::<Base>(), TypeKey::of::<Base>());
        assert_ne!(TypeKey::of::<Base>(), TypeKey::of::<Audio>());
        assert_eq!(TypeKey::of::<Audio>().short_name(), "Audio");
        assert_eq!(TypeKey::of::<Audio>().to_string(), "Audio");
    }

    #[test]
    fn test_short_type_name_keeps_generics() {
        assert_eq!(short_type_name("a::b::Foo"), "Foo");
        assert_eq!(short_type_name("Foo"), "Foo");
        assert_eq!(short_type_name("a::Slot<b::C>"), "Slot<b::C>");
    }

    #[test]
    fn test_describe_reads_declaration() {
        let meta = FeatureMetadata::describe::<Audio>(FeatureKind::Module);
        assert_eq!(meta.menu_path.as_deref(), Some("Media/Audio"));
        assert_eq!(meta.description.as_deref(), Some("音频"));
        // 重复依赖去重
        assert_eq!(meta.dependencies, vec![TypeKey::of::<Base>()]);
        assert_eq!(meta.selection_mode, SelectionMode::Multiple);
    }
}
