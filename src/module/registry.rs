//! 模块注册表（模块列表）
//!
//! 有序地保存模块，保证被依赖的模块总是排在依赖它的模块之前：
//!
//! - 插入前以 DFS（`visited` + 递归栈）检查依赖闭包中是否有环，有环则拒绝，
//!   注册表保持原样
//! - 插入位置为其依赖中下标最大者之后
//! - 移除前检查是否仍有其他模块依赖目标
//! - 维护菜单路径到模块类型的索引
//!
//! 任何增删都会置脏，运行器在下一帧据此完整重建。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::config::ModuleRecord;
use crate::module::catalog::FeatureCatalog;
use crate::module::dependency::DependencyGraph;
use crate::module::feature::FeatureModule;
use crate::module::metadata::{MetadataProvider, TypeKey};
use crate::utils::{CoreError, Result};

/// 模块注册表
#[derive(Debug)]
pub struct ModuleProfile {
    catalog: Arc<FeatureCatalog>,
    modules: Vec<FeatureModule>,
    menu_paths: HashMap<String, TypeKey>,
    dirty: bool,
}

impl ModuleProfile {
    /// 创建空注册表
    pub fn new(catalog: Arc<FeatureCatalog>) -> Self {
        Self {
            catalog,
            modules: Vec::new(),
            menu_paths: HashMap::new(),
            dirty: false,
        }
    }

    /// 从持久化记录构建，逐条按 [`ModuleProfile::add`] 插入
    ///
    /// 返回的注册表已实例化全部子模块且不带脏标记。
    pub fn from_records(catalog: Arc<FeatureCatalog>, records: &[ModuleRecord]) -> Result<Self> {
        let mut profile = Self::new(catalog);
        for record in records {
            let module = FeatureModule::from_record(record, &profile.catalog)?;
            profile.add(module, false)?;
        }
        profile.rebuild_dirty_modules();
        profile.dirty = false;
        Ok(profile)
    }

    /// 导出为持久化记录
    pub fn to_records(&self) -> Vec<ModuleRecord> {
        self.modules.iter().map(FeatureModule::to_record).collect()
    }

    /// 功能目录
    pub fn catalog(&self) -> &Arc<FeatureCatalog> {
        &self.catalog
    }

    // ==================== 增删 ====================

    /// 插入模块
    ///
    /// `overrides` 为 true 且同类型模块已存在时替换它；否则重复插入返回
    /// `ModuleAlreadyRegistered`。依赖闭包中存在环时返回 `CircularDependency`，
    /// 注册表不做任何修改。
    pub fn add(&mut self, module: FeatureModule, overrides: bool) -> Result<()> {
        let key = module.key();
        let existing = self.index_of(key);

        if existing.is_some() && !overrides {
            return Err(CoreError::ModuleAlreadyRegistered(key.to_string()));
        }

        if let Some(cycle) = self.find_cycle_with(key) {
            let cycle: Vec<String> = cycle.iter().map(|k| k.short_name().to_string()).collect();
            warn!(module = %key, cycle = ?cycle, "插入模块被拒绝：存在循环依赖");
            return Err(CoreError::CircularDependency { cycle });
        }

        if let Some(index) = existing {
            self.modules.remove(index);
            debug!(module = %key, "覆盖已存在的模块");
        }

        let index = self.insertion_index(key);
        self.modules.insert(index, module);

        if !self.is_ordered() {
            self.sort_by_dependencies()?;
        }

        self.reindex_menu_paths();
        self.dirty = true;
        info!(module = %key, index = self.index_of(key).unwrap_or(index), "模块已注册");
        Ok(())
    }

    /// 移除模块；仍被其他模块依赖时返回 `ModuleHasDependents`
    pub fn remove(&mut self, key: TypeKey) -> Result<FeatureModule> {
        let index = self
            .index_of(key)
            .ok_or_else(|| CoreError::ModuleNotFound(key.to_string()))?;

        let dependents = self.dependents_of(key);
        if !dependents.is_empty() {
            return Err(CoreError::ModuleHasDependents {
                module: key.to_string(),
                dependents: dependents.iter().map(|k| k.to_string()).collect(),
            });
        }

        let module = self.modules.remove(index);
        self.reindex_menu_paths();
        self.dirty = true;
        info!(module = %key, "模块已移除");
        Ok(module)
    }

    // ==================== 查询 ====================

    /// 是否包含某类型
    pub fn has(&self, key: TypeKey) -> bool {
        self.index_of(key).is_some()
    }

    /// 是否包含具体类型
    pub fn contains<M: 'static>(&self) -> bool {
        self.has(TypeKey::of::<M>())
    }

    /// 是否包含与该模块同类型的条目
    pub fn has_module(&self, module: &FeatureModule) -> bool {
        self.has(module.key())
    }

    /// 声明的依赖列表，未声明时为空
    pub fn get_dependencies(&self, key: TypeKey) -> Vec<TypeKey> {
        self.catalog.dependencies(key).to_vec()
    }

    /// 依赖 `key` 的已注册模块
    pub fn dependents_of(&self, key: TypeKey) -> Vec<TypeKey> {
        self.modules
            .iter()
            .filter(|m| m.key() != key && self.catalog.dependencies(m.key()).contains(&key))
            .map(FeatureModule::key)
            .collect()
    }

    /// 下标
    pub fn index_of(&self, key: TypeKey) -> Option<usize> {
        self.modules.iter().position(|m| m.key() == key)
    }

    /// 查询模块
    pub fn get(&self, key: TypeKey) -> Option<&FeatureModule> {
        self.modules.iter().find(|m| m.key() == key)
    }

    /// 查询模块（可变）
    pub fn get_mut(&mut self, key: TypeKey) -> Option<&mut FeatureModule> {
        self.modules.iter_mut().find(|m| m.key() == key)
    }

    /// 全部模块，按依赖顺序
    pub fn modules(&self) -> &[FeatureModule] {
        &self.modules
    }

    /// 全部模块类型，按依赖顺序
    pub fn keys(&self) -> Vec<TypeKey> {
        self.modules.iter().map(FeatureModule::key).collect()
    }

    /// 模块数
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    // ==================== 菜单路径 ====================

    /// 按菜单路径解析模块
    pub fn resolve_menu_path(&self, path: &str) -> Option<TypeKey> {
        self.menu_paths.get(path).copied()
    }

    /// 按类型名或菜单路径解析已注册的模块
    pub fn resolve_name(&self, name: &str) -> Option<TypeKey> {
        self.resolve_menu_path(name).or_else(|| {
            self.catalog
                .resolve(name)
                .filter(|key| self.has(*key))
        })
    }

    /// 模块的菜单路径：模块自身声明的，否则取第一个子模块声明的
    pub fn menu_path_of(&self, key: TypeKey) -> Option<String> {
        if let Some(path) = self.catalog.menu_path(key) {
            return Some(path.to_string());
        }
        let module = self.get(key)?;
        let first = module.submodule_names().first()?;
        let sub = self.catalog.resolve(first)?;
        self.catalog.menu_path(sub).map(str::to_string)
    }

    /// 全部菜单路径
    pub fn menu_paths(&self) -> impl Iterator<Item = (&str, TypeKey)> {
        self.menu_paths.iter().map(|(path, key)| (path.as_str(), *key))
    }

    // ==================== 脏标记 ====================

    /// 模块列表或任一模块的子模块列表被修改过
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.modules.iter().any(FeatureModule::is_dirty)
    }

    /// 标记为脏
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// 清除列表的脏标记（模块自身的标记由重建清除）
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// 重建所有被置脏模块的子模块实例，返回重建的模块数
    pub fn rebuild_dirty_modules(&mut self) -> usize {
        let catalog = Arc::clone(&self.catalog);
        let mut rebuilt = 0;
        for module in self.modules.iter_mut().filter(|m| m.is_dirty()) {
            module.rebuild_submodules(&catalog);
            rebuilt += 1;
        }
        if rebuilt > 0 {
            self.reindex_menu_paths();
        }
        rebuilt
    }

    // ==================== 内部 ====================

    /// 在"已注册模块 + 候选模块"构成的依赖图中查找从候选出发的环
    fn find_cycle_with(&self, candidate: TypeKey) -> Option<Vec<TypeKey>> {
        let mut graph = DependencyGraph::new();
        let present = |key: TypeKey| key == candidate || self.has(key);

        let mut nodes = self.keys();
        nodes.push(candidate);
        for key in nodes {
            graph.add_node(key);
            for &dep in self.catalog.dependencies(key) {
                if present(dep) {
                    graph.add_dependency(key, dep);
                }
            }
        }

        graph.find_cycle_from(candidate)
    }

    /// 依赖中下标最大者之后；没有已注册的依赖时插在最前
    fn insertion_index(&self, key: TypeKey) -> usize {
        let deps = self.catalog.dependencies(key);
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, m)| deps.contains(&m.key()))
            .map(|(i, _)| i + 1)
            .max()
            .unwrap_or(0)
    }

    fn is_ordered(&self) -> bool {
        self.modules.iter().enumerate().all(|(i, m)| {
            self.catalog
                .dependencies(m.key())
                .iter()
                .all(|dep| self.index_of(*dep).map_or(true, |d| d < i))
        })
    }

    /// 稳定地按依赖重排
    fn sort_by_dependencies(&mut self) -> Result<()> {
        let mut graph = DependencyGraph::new();
        for module in &self.modules {
            graph.add_node(module.key());
        }
        for module in &self.modules {
            for &dep in self.catalog.dependencies(module.key()) {
                if graph.contains(dep) {
                    graph.add_dependency(module.key(), dep);
                }
            }
        }

        let order = graph.topological_sort()?;
        let mut slots: Vec<Option<FeatureModule>> = self.modules.drain(..).map(Some).collect();
        let position: HashMap<TypeKey, usize> = slots
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.as_ref().map(|m| (m.key(), i)))
            .collect();

        for key in order {
            if let Some(module) = position.get(&key).and_then(|&i| slots[i].take()) {
                self.modules.push(module);
            }
        }
        debug!("注册表已按依赖重新排序");
        Ok(())
    }

    fn reindex_menu_paths(&mut self) {
        let mut index = HashMap::new();
        for module in &self.modules {
            let Some(path) = self.menu_path_of(module.key()) else {
                continue;
            };
            if let Some(existing) = index.get(&path) {
                warn!(
                    menu_path = %path,
                    existing = %existing,
                    module = %module.key(),
                    "菜单路径重复，保留先注册的模块"
                );
                continue;
            }
            index.insert(path, module.key());
        }
        self.menu_paths = index;
    }
}
