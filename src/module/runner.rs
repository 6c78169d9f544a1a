//! 运行器
//!
//! 运行器持有运行中的模块集合、已登记的子模块列表以及由其派生的
//! tick / 绘制列表，负责：
//!
//! - 按依赖顺序启动模块（重新排队循环），异步启动由启动队列协作推进
//! - 每帧依次执行：状态跳变检测 → 延迟增删 → 脏列表完整重建 →
//!   派生列表重建 → tick 分发 → 转交 tick 期间发出的命令
//! - 以菜单路径寻址的延迟修改接口
//! - 模块变更通知与阶段耗时采样
//!
//! 运行器只在宿主的单个帧回调线程中被驱动，所有可变状态都由它独占，
//! 因此不需要任何锁。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::config::{CoreConfig, RunnerConfig};
use crate::core::parameters::ParameterStore;
use crate::module::catalog::FeatureCatalog;
use crate::module::component::ComponentProfile;
use crate::module::context::{FrameClock, FrameInfo, RunnerCommand, TickContext};
use crate::module::events::{ModuleCallback, ModuleEvent, ModuleEvents};
use crate::module::feature::FeatureModule;
use crate::module::lifecycle::{StartupQueue, StartupTask, SubmoduleRef};
use crate::module::metadata::{MetadataProvider, TypeKey};
use crate::module::registry::ModuleProfile;
use crate::module::submodule::{StartupProgress, SubmoduleSlot, SubmoduleState};
use crate::utils::{Phase, Result, RunnerMetrics, SubscriptionId};

/// 运行器
#[derive(Debug)]
pub struct Runner {
    config: RunnerConfig,
    modules: ModuleProfile,
    components: ComponentProfile,
    parameters: ParameterStore,

    /// 运行中的模块，按注册表顺序
    running: Vec<TypeKey>,
    /// 已执行过启动的模块，按注册表顺序；关闭时逆序遍历
    started_order: Vec<TypeKey>,
    /// 运行期被移除的模块，重建时不会因跟随注册表而重新加入
    runtime_removed: HashSet<TypeKey>,

    all_submodules: Vec<SubmoduleRef>,
    tickables: Vec<SubmoduleRef>,
    drawables: Vec<SubmoduleRef>,

    /// 仅用于检测帧间跳变，不是权威状态
    module_active_states: HashMap<TypeKey, bool>,
    submodule_enabled_states: HashMap<SubmoduleRef, bool>,

    pending_add: Vec<TypeKey>,
    pending_remove: Vec<TypeKey>,
    pending_active: Vec<(TypeKey, bool)>,
    commands: Vec<RunnerCommand>,

    startups: StartupQueue,
    clock: FrameClock,
    events: ModuleEvents,
    metrics: RunnerMetrics,

    is_running: bool,
    needs_rebuild: bool,
    last_module_count: usize,
}

impl Runner {
    /// 以模块列表与组件列表创建
    pub fn new(modules: ModuleProfile, components: ComponentProfile) -> Self {
        Self {
            config: RunnerConfig::default(),
            modules,
            components,
            parameters: ParameterStore::new(),
            running: Vec::new(),
            started_order: Vec::new(),
            runtime_removed: HashSet::new(),
            all_submodules: Vec::new(),
            tickables: Vec::new(),
            drawables: Vec::new(),
            module_active_states: HashMap::new(),
            submodule_enabled_states: HashMap::new(),
            pending_add: Vec::new(),
            pending_remove: Vec::new(),
            pending_active: Vec::new(),
            commands: Vec::new(),
            startups: StartupQueue::new(),
            clock: FrameClock::new(),
            events: ModuleEvents::new(),
            metrics: RunnerMetrics::new(),
            is_running: false,
            needs_rebuild: false,
            last_module_count: 0,
        }
    }

    /// 设置运行器配置
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置参数存储
    pub fn with_parameters(mut self, parameters: ParameterStore) -> Self {
        self.parameters = parameters;
        self
    }

    /// 从完整配置构建：模块与组件列表经功能目录反序列化
    pub fn from_config(catalog: Arc<FeatureCatalog>, config: &CoreConfig) -> Result<Self> {
        let components = ComponentProfile::from_records(&catalog, &config.profile.components)?;
        let modules = ModuleProfile::from_records(catalog, &config.profile.modules)?;
        info!(
            modules = modules.len(),
            components = components.len(),
            "已从配置构建运行器"
        );
        Ok(Self::new(modules, components)
            .with_config(config.runner.clone())
            .with_parameters(ParameterStore::from(config.parameters.clone())))
    }

    // ==================== 宿主钩子 ====================

    /// 启用：按依赖顺序启动模块
    #[instrument(skip(self))]
    pub fn enable(&mut self) {
        if self.is_running {
            debug!("运行器已启用，忽略");
            return;
        }

        info!(registered = self.modules.len(), "启用运行器");
        self.startups.abandon();
        self.running = self.resolve_startup_modules();
        self.clock.reset();

        let sample = self.metrics.begin(Phase::Rebuild);
        self.startup_all_modules();
        self.metrics.end(sample);

        self.is_running = true;
    }

    /// 推进一帧，使用真实流逝时间
    pub fn update(&mut self) {
        let delta = self.clock.measure();
        self.update_with_delta(delta);
    }

    /// 推进一帧，时间由宿主给出
    pub fn update_with_delta(&mut self, delta: Duration) {
        if !self.is_running {
            return;
        }

        let frame = self.clock.advance(delta);

        if self.running.len() != self.last_module_count {
            self.last_module_count = self.running.len();
            self.needs_rebuild = true;
        }

        self.apply_pending_active();
        self.check_state_transitions();

        if !self.pending_add.is_empty() || !self.pending_remove.is_empty() {
            self.process_pending_modules();
        }

        if self.modules.is_dirty() || self.components.is_dirty() {
            self.refresh_all_modules();
        }

        if self.drive_startups() > 0 {
            self.needs_rebuild = true;
        }

        if self.needs_rebuild {
            self.rebuild_projections();
        }

        self.tick_all(frame);
        self.flush_commands();
    }

    /// 停用：逆序关闭全部模块
    #[instrument(skip(self))]
    pub fn disable(&mut self) {
        if !self.is_running {
            return;
        }

        info!(running = self.running.len(), "停用运行器");
        self.is_running = false;
        self.shutdown_all_modules();
        self.running.clear();
        self.module_active_states.clear();
        self.pending_add.clear();
        self.pending_remove.clear();
        self.pending_active.clear();
        self.commands.clear();
        self.events.publish(ModuleEvent::Reset);
    }

    /// 分发 GUI 绘制
    pub fn draw_gui(&mut self) {
        if !self.is_running {
            return;
        }
        let sample = self.metrics.begin(Phase::DrawGui);
        for r in &self.drawables {
            if let Some(slot) = active_slot_mut(&mut self.modules, *r) {
                slot.draw_gui();
            }
        }
        self.metrics.end(sample);
    }

    /// 分发调试图形绘制
    pub fn draw_gizmos(&mut self) {
        if !self.is_running {
            return;
        }
        let sample = self.metrics.begin(Phase::DrawGizmos);
        for r in &self.drawables {
            if let Some(slot) = active_slot_mut(&mut self.modules, *r) {
                slot.draw_gizmos();
            }
        }
        self.metrics.end(sample);
    }

    // ==================== 菜单路径接口 ====================

    /// 请求在下一帧加入模块，路径无法解析时返回 false
    ///
    /// 对仍在运行的模块调用会撤销同一模块尚未生效的移除请求。
    pub fn add_module(&mut self, menu_path: &str) -> bool {
        let Some(key) = self.modules.resolve_menu_path(menu_path) else {
            warn!(menu_path = %menu_path, "无法解析菜单路径");
            return false;
        };

        self.pending_remove.retain(|k| *k != key);
        self.runtime_removed.remove(&key);
        if !self.running.contains(&key) && !self.pending_add.contains(&key) {
            self.pending_add.push(key);
            debug!(module = %key, "模块加入请求已排队");
        }
        true
    }

    /// 请求在下一帧移除模块，路径无法解析时返回 false
    pub fn remove_module(&mut self, menu_path: &str) -> bool {
        let Some(key) = self.modules.resolve_menu_path(menu_path) else {
            warn!(menu_path = %menu_path, "无法解析菜单路径");
            return false;
        };

        self.pending_add.retain(|k| *k != key);
        if self.running.contains(&key) && !self.pending_remove.contains(&key) {
            self.pending_remove.push(key);
            debug!(module = %key, "模块移除请求已排队");
        }
        true
    }

    /// 模块是否在运行且处于激活状态
    pub fn get_module_active(&self, menu_path: &str) -> bool {
        self.modules
            .resolve_menu_path(menu_path)
            .filter(|key| self.running.contains(key))
            .and_then(|key| self.modules.get(key))
            .map(FeatureModule::is_active)
            .unwrap_or(false)
    }

    /// 请求在下一帧设置模块激活状态，路径无法解析时返回 false
    pub fn set_module_active(&mut self, menu_path: &str, active: bool) -> bool {
        let Some(key) = self.modules.resolve_menu_path(menu_path) else {
            warn!(menu_path = %menu_path, "无法解析菜单路径");
            return false;
        };

        self.pending_active.retain(|(k, _)| *k != key);
        self.pending_active.push((key, active));
        true
    }

    /// 设置某类型子模块的启用标记，实际启动/关闭在下一帧生效；返回受影响的实例数
    pub fn set_submodule_enabled(&mut self, key: TypeKey, enabled: bool) -> usize {
        let mut count = 0;
        for module in self.modules.keys() {
            let Some(module) = self.modules.get_mut(module) else {
                continue;
            };
            for slot in module.submodules_mut().iter_mut().filter(|s| s.key() == key) {
                slot.set_enabled(enabled);
                count += 1;
            }
        }
        count
    }

    // ==================== 注册表操作 ====================

    /// 向注册表插入模块；运行中时会在下一帧完整重建
    pub fn register_module(&mut self, module: FeatureModule, overrides: bool) -> Result<()> {
        let key = module.key();
        if overrides && self.started_order.contains(&key) {
            self.shutdown_module(key);
        }
        self.modules.add(module, overrides)
    }

    /// 从注册表移除模块；运行中的模块先被关闭
    pub fn unregister_module(&mut self, key: TypeKey) -> Result<FeatureModule> {
        if !self.modules.dependents_of(key).is_empty() {
            // 交给注册表报告依赖方
            return self.modules.remove(key);
        }
        if self.running.contains(&key) {
            self.shutdown_module(key);
            self.running.retain(|k| *k != key);
            self.module_active_states.remove(&key);
            self.events.publish(ModuleEvent::Removed(key));
        }
        self.modules.remove(key)
    }

    /// 替换模块与组件列表；运行中时立即完整重建
    pub fn set_profiles(&mut self, modules: ModuleProfile, components: ComponentProfile) {
        if self.is_running {
            self.shutdown_all_modules();
        }
        self.modules = modules;
        self.components = components;
        if self.is_running {
            self.startups.abandon();
            self.running = self.resolve_startup_modules();
            self.startup_all_modules();
        }
    }

    // ==================== 订阅 ====================

    /// 订阅模块变更
    pub fn subscribe(&mut self, callback: ModuleCallback) -> SubscriptionId {
        self.events.subscribe(callback)
    }

    /// 取消订阅
    pub fn unsubscribe(&mut self, id: &SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // ==================== 查询 ====================

    /// 是否已启用
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// 运行中的模块
    pub fn running_modules(&self) -> &[TypeKey] {
        &self.running
    }

    /// 已登记的全部子模块
    pub fn all_submodules(&self) -> &[SubmoduleRef] {
        &self.all_submodules
    }

    /// tick 列表
    pub fn tickables(&self) -> &[SubmoduleRef] {
        &self.tickables
    }

    /// 绘制列表
    pub fn drawables(&self) -> &[SubmoduleRef] {
        &self.drawables
    }

    /// 尚未完成的异步启动数
    pub fn pending_startups(&self) -> usize {
        self.startups.len()
    }

    /// 已推进的帧数
    pub fn cycle(&self) -> u64 {
        self.clock.cycle()
    }

    /// 查找某类型的第一个可用子模块（已启用、已启动、所属模块激活）
    pub fn find_submodule(&self, key: TypeKey) -> Option<SubmoduleRef> {
        self.all_submodules.iter().copied().find(|r| {
            self.available_slot(*r)
                .map(|slot| slot.key() == key)
                .unwrap_or(false)
        })
    }

    /// 该位置的子模块是否仍可用
    pub fn is_available(&self, r: SubmoduleRef) -> bool {
        self.all_submodules.contains(&r) && self.available_slot(r).is_some()
    }

    fn available_slot(&self, r: SubmoduleRef) -> Option<&SubmoduleSlot> {
        let module = self.modules.get(r.module)?;
        if !module.is_active() {
            return None;
        }
        module
            .submodule(r.index)
            .filter(|slot| slot.is_enabled() && slot.is_started())
    }

    /// 按位置取子模块
    pub fn submodule(&self, r: SubmoduleRef) -> Option<&SubmoduleSlot> {
        self.modules.get(r.module)?.submodule(r.index)
    }

    /// 按位置取子模块（可变）
    pub fn submodule_mut(&mut self, r: SubmoduleRef) -> Option<&mut SubmoduleSlot> {
        self.modules.get_mut(r.module)?.submodule_mut(r.index)
    }

    /// 性能采样
    pub fn metrics(&self) -> &RunnerMetrics {
        &self.metrics
    }

    /// 性能采样（可变）
    pub fn metrics_mut(&mut self) -> &mut RunnerMetrics {
        &mut self.metrics
    }

    /// 模块列表
    pub fn modules(&self) -> &ModuleProfile {
        &self.modules
    }

    /// 模块列表（可变）；增删会在下一帧触发完整重建
    pub fn modules_mut(&mut self) -> &mut ModuleProfile {
        &mut self.modules
    }

    /// 组件列表
    pub fn components(&self) -> &ComponentProfile {
        &self.components
    }

    /// 组件列表（可变）；增删会在下一帧触发完整重建
    pub fn components_mut(&mut self) -> &mut ComponentProfile {
        &mut self.components
    }

    /// 参数存储
    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    /// 参数存储（可变）；Preparable 子模块在下一次启动时读取
    pub fn parameters_mut(&mut self) -> &mut ParameterStore {
        &mut self.parameters
    }

    /// 运行器配置
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    // ==================== 启动 ====================

    fn resolve_startup_modules(&self) -> Vec<TypeKey> {
        if self.config.startup_modules.is_empty() {
            return self
                .modules
                .keys()
                .into_iter()
                .filter(|k| !self.runtime_removed.contains(k))
                .collect();
        }

        let mut keys = Vec::new();
        for name in &self.config.startup_modules {
            match self.modules.resolve_name(name) {
                Some(key) if !keys.contains(&key) => keys.push(key),
                Some(_) => {}
                None => warn!(module = %name, "启动模块未注册，已忽略"),
            }
        }
        self.sort_by_profile(&mut keys);
        keys
    }

    fn sort_by_profile(&self, keys: &mut [TypeKey]) {
        keys.sort_by_key(|k| self.modules.index_of(*k).unwrap_or(usize::MAX));
    }

    /// 依赖检查：每个依赖都必须在运行且处于激活状态
    fn check_module_dependencies(&self, key: TypeKey) -> bool {
        if self.config.dependency_checks_skipped() {
            return true;
        }

        let mut satisfied = true;
        for dep in self.modules.get_dependencies(key) {
            if !self.module_running_and_active(dep) {
                warn!(module = %key, dependency = %dep, "依赖模块未运行或未激活，跳过启动");
                satisfied = false;
            }
        }
        satisfied
    }

    fn module_running_and_active(&self, key: TypeKey) -> bool {
        self.running.contains(&key)
            && self
                .modules
                .get(key)
                .map(FeatureModule::is_active)
                .unwrap_or(false)
    }

    /// 子模块声明的依赖：模块类型要求运行且激活，子模块类型要求已登记、已启用且未启动失败
    fn submodule_dependencies_met(&self, owner: TypeKey, submodule: TypeKey) -> bool {
        if self.config.dependency_checks_skipped() {
            return true;
        }

        for &dep in self.modules.catalog().dependencies(submodule) {
            let met = if self.modules.has(dep) {
                self.module_running_and_active(dep)
            } else {
                self.all_submodules.iter().any(|r| {
                    self.modules
                        .get(r.module)
                        .filter(|m| m.is_active())
                        .and_then(|m| m.submodule(r.index))
                        .map(|s| {
                            s.key() == dep
                                && s.is_enabled()
                                && s.state() != SubmoduleState::Failed
                        })
                        .unwrap_or(false)
                })
            };
            if !met {
                warn!(
                    module = %owner,
                    submodule = %submodule,
                    dependency = %dep,
                    "子模块依赖未满足，跳过启动"
                );
                return false;
            }
        }
        true
    }

    /// 按依赖顺序启动全部运行中的激活模块
    fn startup_all_modules(&mut self) {
        self.clear_live_state();

        let rebuilt = self.modules.rebuild_dirty_modules();
        if rebuilt > 0 {
            debug!(rebuilt, "已重建子模块实例");
        }
        self.modules.clear_dirty();
        self.components.clear_dirty();

        let mut running = std::mem::take(&mut self.running);
        running.retain(|k| self.modules.has(*k));
        self.sort_by_profile(&mut running);
        self.running = running;

        for &key in &self.running {
            let active = self
                .modules
                .get(key)
                .map(FeatureModule::is_active)
                .unwrap_or(false);
            self.module_active_states.insert(key, active);
        }

        let mut queue: VecDeque<TypeKey> = self
            .running
            .iter()
            .copied()
            .filter(|k| self.module_running_and_active(*k) && self.check_module_dependencies(*k))
            .collect();

        if !self.config.dependency_checks_skipped() {
            // 依赖本身因依赖未满足被排除时，依赖方也一并排除
            loop {
                let queued: HashSet<TypeKey> = queue.iter().copied().collect();
                let before = queue.len();
                queue.retain(|key| {
                    let missing = self
                        .modules
                        .get_dependencies(*key)
                        .into_iter()
                        .find(|dep| !queued.contains(dep));
                    if let Some(dep) = missing {
                        warn!(module = %key, dependency = %dep, "依赖模块未能启动，跳过启动");
                        return false;
                    }
                    true
                });
                if queue.len() == before {
                    break;
                }
            }
        }

        let mut initialized: HashSet<TypeKey> = HashSet::new();
        let mut requeued = 0;
        while let Some(key) = queue.pop_front() {
            let ready = self.config.dependency_checks_skipped()
                || self
                    .modules
                    .get_dependencies(key)
                    .iter()
                    .all(|dep| initialized.contains(dep));

            if !ready {
                queue.push_back(key);
                requeued += 1;
                if requeued > queue.len() {
                    warn!(remaining = queue.len(), "剩余模块的依赖无法满足，停止启动");
                    break;
                }
                continue;
            }

            requeued = 0;
            self.start_module(key);
            initialized.insert(key);
        }

        self.drive_startups();
        self.rebuild_projections();
        self.last_module_count = self.running.len();
        info!(
            running = self.running.len(),
            started = self.started_order.len(),
            submodules = self.all_submodules.len(),
            pending = self.startups.len(),
            "模块启动完成"
        );
        self.events.publish(ModuleEvent::Reset);
    }

    /// 启动单个模块的子模块：全部登记，已启用且依赖满足的开始启动
    fn start_module(&mut self, key: TypeKey) {
        let Some(count) = self.modules.get(key).map(|m| m.submodules().len()) else {
            return;
        };

        debug!(module = %key, submodules = count, "启动模块");
        for index in 0..count {
            let r = SubmoduleRef::new(key, index);
            let Some((sub_key, enabled)) = self
                .submodule(r)
                .map(|slot| (slot.key(), slot.is_enabled()))
            else {
                continue;
            };

            if !self.all_submodules.contains(&r) {
                self.all_submodules.push(r);
            }
            self.submodule_enabled_states.insert(r, enabled);

            if enabled && self.submodule_dependencies_met(key, sub_key) {
                self.begin_startup(r);
            }
        }

        if !self.started_order.contains(&key) {
            self.started_order.push(key);
            // 重新激活的依赖不能排在仍在运行的依赖方之后
            let mut order = std::mem::take(&mut self.started_order);
            self.sort_by_profile(&mut order);
            self.started_order = order;
        }
        self.needs_rebuild = true;
    }

    /// 启动队列空闲时立即启动，否则排到队尾
    fn begin_startup(&mut self, r: SubmoduleRef) {
        if !self.startups.is_idle() {
            self.startups.defer_begin(r);
            return;
        }
        if self.run_startup(r) == StartupProgress::Pending {
            self.startups.defer_resume(r);
        }
    }

    /// 绑定组件后启动
    fn run_startup(&mut self, r: SubmoduleRef) -> StartupProgress {
        let Some(slot) = self
            .modules
            .get_mut(r.module)
            .and_then(|m| m.submodule_mut(r.index))
        else {
            return StartupProgress::Skipped;
        };

        let sample = self.metrics.begin(Phase::Startup);
        if slot.capabilities().component_bound {
            slot.bind_component(&self.components);
        }
        let progress = slot.startup(&self.parameters);
        self.metrics.end(sample);
        progress
    }

    /// 推进启动队列，返回本次完成的启动数
    fn drive_startups(&mut self) -> usize {
        if self.startups.is_idle() {
            return 0;
        }

        let mut queue = std::mem::take(&mut self.startups);
        let completed = queue.drive(|task| match task {
            StartupTask::Begin(r) => {
                let enabled = self.submodule(r).map(SubmoduleSlot::is_enabled);
                match enabled {
                    Some(true) => self.run_startup(r),
                    _ => StartupProgress::Skipped,
                }
            }
            StartupTask::Resume(r) => {
                let parameters = &self.parameters;
                match self
                    .modules
                    .get_mut(r.module)
                    .and_then(|m| m.submodule_mut(r.index))
                {
                    Some(slot) => slot.resume_startup(parameters),
                    None => StartupProgress::Skipped,
                }
            }
        });
        self.startups = queue;

        if completed > 0 {
            debug!(completed, remaining = self.startups.len(), "异步启动推进");
        }
        completed
    }

    // ==================== 关闭 ====================

    /// 关闭单个模块：子模块按声明顺序关闭，并从全部列表与缓存中移除
    fn shutdown_module(&mut self, key: TypeKey) {
        self.startups.remove_module(key);

        let sample = self.metrics.begin(Phase::Shutdown);
        let mut closed = 0;
        if let Some(module) = self.modules.get_mut(key) {
            for slot in module.submodules_mut() {
                if slot.shutdown() {
                    closed += 1;
                }
            }
        }
        self.metrics.end(sample);

        self.all_submodules.retain(|r| r.module != key);
        self.tickables.retain(|r| r.module != key);
        self.drawables.retain(|r| r.module != key);
        self.submodule_enabled_states.retain(|r, _| r.module != key);
        self.started_order.retain(|k| *k != key);
        self.needs_rebuild = true;
        debug!(module = %key, closed, "模块已关闭");
    }

    fn shutdown_submodule(&mut self, r: SubmoduleRef) {
        self.startups.cancel(r);
        let sample = self.metrics.begin(Phase::Shutdown);
        if let Some(slot) = self.submodule_mut(r) {
            slot.shutdown();
        }
        self.metrics.end(sample);
    }

    /// 按注册表顺序的逆序关闭全部模块，并清空运行期状态
    fn shutdown_all_modules(&mut self) {
        self.startups.abandon();

        let order: Vec<TypeKey> = self.started_order.iter().rev().copied().collect();
        let sample = self.metrics.begin(Phase::Shutdown);
        for key in order {
            if let Some(module) = self.modules.get_mut(key) {
                for slot in module.submodules_mut() {
                    slot.shutdown();
                }
            }
            debug!(module = %key, "模块已关闭");
        }
        self.metrics.end(sample);

        self.clear_live_state();
    }

    fn clear_live_state(&mut self) {
        self.started_order.clear();
        self.all_submodules.clear();
        self.tickables.clear();
        self.drawables.clear();
        self.module_active_states.clear();
        self.submodule_enabled_states.clear();
        self.needs_rebuild = false;
    }

    // ==================== 每帧步骤 ====================

    fn apply_pending_active(&mut self) {
        for (key, active) in std::mem::take(&mut self.pending_active) {
            if let Some(module) = self.modules.get_mut(key) {
                module.set_active(active);
                debug!(module = %key, active, "模块激活状态已更新");
            }
        }
    }

    /// 比较缓存与实际状态，对跳变执行启动或关闭
    fn check_state_transitions(&mut self) {
        let running = self.running.clone();
        for key in running {
            let Some(active) = self.modules.get(key).map(FeatureModule::is_active) else {
                continue;
            };
            let cached = self.module_active_states.get(&key).copied().unwrap_or(false);
            if active == cached {
                continue;
            }

            self.module_active_states.insert(key, active);
            if active {
                info!(module = %key, "模块被激活");
                if self.check_module_dependencies(key) {
                    self.start_module(key);
                }
            } else {
                info!(module = %key, "模块被停用");
                self.shutdown_module(key);
            }
            self.needs_rebuild = true;
        }

        let refs = self.all_submodules.clone();
        for r in refs {
            let Some(slot) = self
                .modules
                .get(r.module)
                .filter(|m| m.is_active())
                .and_then(|m| m.submodule(r.index))
            else {
                continue;
            };
            let (sub_key, enabled) = (slot.key(), slot.is_enabled());
            let cached = self
                .submodule_enabled_states
                .get(&r)
                .copied()
                .unwrap_or(enabled);
            if enabled == cached {
                continue;
            }

            self.submodule_enabled_states.insert(r, enabled);
            if enabled {
                debug!(module = %r.module, submodule = %sub_key, "子模块被启用");
                if self.submodule_dependencies_met(r.module, sub_key) {
                    self.begin_startup(r);
                }
            } else {
                debug!(module = %r.module, submodule = %sub_key, "子模块被禁用");
                self.shutdown_submodule(r);
            }
            self.needs_rebuild = true;
        }
    }

    /// 先处理移除，再按注册表顺序处理加入
    fn process_pending_modules(&mut self) {
        for key in std::mem::take(&mut self.pending_remove) {
            self.evict_running_module(key);
        }

        let mut to_add = std::mem::take(&mut self.pending_add);
        self.sort_by_profile(&mut to_add);
        for key in to_add {
            if !self.modules.has(key) {
                warn!(module = %key, "模块不在注册表中，无法加入");
                continue;
            }
            let mut visiting = Vec::new();
            self.add_running_module(key, &mut visiting);
        }

        self.needs_rebuild = true;
    }

    /// 移除运行中的模块；依赖它的运行中模块先被移除
    fn evict_running_module(&mut self, key: TypeKey) {
        if !self.running.contains(&key) {
            return;
        }

        let mut dependents: Vec<TypeKey> = self
            .modules
            .dependents_of(key)
            .into_iter()
            .filter(|k| self.running.contains(k))
            .collect();
        self.sort_by_profile(&mut dependents);
        for dependent in dependents.into_iter().rev() {
            warn!(module = %dependent, dependency = %key, "依赖的模块被移除，一并移除");
            self.evict_running_module(dependent);
        }

        self.shutdown_module(key);
        self.running.retain(|k| *k != key);
        self.module_active_states.remove(&key);
        self.runtime_removed.insert(key);
        info!(module = %key, "模块已在运行期移除");
        self.events.publish(ModuleEvent::Removed(key));
    }

    /// 加入模块，缺失的依赖递归地先行加入
    fn add_running_module(&mut self, key: TypeKey, visiting: &mut Vec<TypeKey>) -> bool {
        if self.running.contains(&key) {
            return true;
        }
        if visiting.contains(&key) {
            return false;
        }

        visiting.push(key);
        if !self.config.dependency_checks_skipped() {
            for dep in self.modules.get_dependencies(key) {
                if self.running.contains(&dep) {
                    continue;
                }
                if !self.modules.has(dep) {
                    warn!(module = %key, dependency = %dep, "依赖模块未注册，无法加入");
                    visiting.pop();
                    return false;
                }
                if !self.add_running_module(dep, visiting) {
                    visiting.pop();
                    return false;
                }
            }
        }
        visiting.pop();

        self.activate_running_module(key);
        true
    }

    fn activate_running_module(&mut self, key: TypeKey) {
        let catalog = Arc::clone(self.modules.catalog());
        let Some(module) = self.modules.get_mut(key) else {
            return;
        };
        if module.is_dirty() {
            module.rebuild_submodules(&catalog);
        }
        let active = module.is_active();

        let position = self.modules.index_of(key).unwrap_or(usize::MAX);
        let at = self
            .running
            .iter()
            .position(|k| self.modules.index_of(*k).unwrap_or(usize::MAX) > position)
            .unwrap_or(self.running.len());
        self.running.insert(at, key);
        self.runtime_removed.remove(&key);
        self.module_active_states.insert(key, active);

        if active && self.check_module_dependencies(key) {
            self.start_module(key);
        }
        info!(module = %key, active, "模块已在运行期加入");
        self.events.publish(ModuleEvent::Added(key));
    }

    /// 模块或组件列表被修改：全部关闭后重新启动
    fn refresh_all_modules(&mut self) {
        info!("模块或组件列表已变更，完整重建");
        let sample = self.metrics.begin(Phase::Rebuild);

        self.shutdown_all_modules();
        if self.config.startup_modules.is_empty() {
            self.running = self.resolve_startup_modules();
        }
        self.startup_all_modules();

        self.metrics.end(sample);
    }

    /// 从全部子模块中筛选出已启用、已启动且所属模块激活的，划分 tick / 绘制列表
    fn rebuild_projections(&mut self) {
        self.tickables.clear();
        self.drawables.clear();

        // 重新激活的模块追加在末尾，按注册表顺序恢复
        let modules = &self.modules;
        self.all_submodules
            .sort_by_key(|r| (modules.index_of(r.module).unwrap_or(usize::MAX), r.index));

        for r in &self.all_submodules {
            let Some(slot) = self
                .modules
                .get(r.module)
                .filter(|m| m.is_active())
                .and_then(|m| m.submodule(r.index))
            else {
                continue;
            };
            if !slot.is_enabled() || !slot.is_started() {
                continue;
            }
            let caps = slot.capabilities();
            if caps.tickable {
                self.tickables.push(*r);
            }
            if caps.drawable {
                self.drawables.push(*r);
            }
        }

        self.needs_rebuild = false;
        debug!(
            tickables = self.tickables.len(),
            drawables = self.drawables.len(),
            "派生列表已重建"
        );
    }

    fn tick_all(&mut self, frame: FrameInfo) {
        let sample = self.metrics.begin(Phase::Tick);
        let mut commands = std::mem::take(&mut self.commands);

        for r in &self.tickables {
            if let Some(slot) = active_slot_mut(&mut self.modules, *r) {
                let mut ctx = TickContext::new(frame, &mut commands);
                slot.tick(&mut ctx);
            }
        }

        self.commands = commands;
        self.metrics.end(sample);
    }

    /// 把 tick 期间发出的命令转交菜单路径接口，下一帧生效
    fn flush_commands(&mut self) {
        for command in std::mem::take(&mut self.commands) {
            let accepted = match &command {
                RunnerCommand::AddModule(path) => self.add_module(path),
                RunnerCommand::RemoveModule(path) => self.remove_module(path),
                RunnerCommand::SetModuleActive(path, active) => {
                    self.set_module_active(path, *active)
                }
            };
            if !accepted {
                warn!(command = ?command, "命令未被接受");
            }
        }
    }
}

fn active_slot_mut(modules: &mut ModuleProfile, r: SubmoduleRef) -> Option<&mut SubmoduleSlot> {
    modules
        .get_mut(r.module)
        .filter(|m| m.is_active())
        .and_then(|m| m.submodule_mut(r.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::context::StartupContext;
    use crate::module::metadata::FeatureDescriptor;
    use crate::module::submodule::{Submodule, Tickable};
    use std::cell::RefCell;
    use std::task::Poll;

    thread_local! {
        static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn log(entry: impl Into<String>) {
        LOG.with(|l| l.borrow_mut().push(entry.into()));
    }

    fn take_log() -> Vec<String> {
        LOG.with(|l| std::mem::take(&mut *l.borrow_mut()))
    }

    struct Base;
    impl FeatureDescriptor for Base {
        const MENU_PATH: Option<&'static str> = Some("Base");
    }

    struct Top;
    impl FeatureDescriptor for Top {
        const MENU_PATH: Option<&'static str> = Some("Top");
        fn dependencies() -> Vec<TypeKey> {
            vec![TypeKey::of::<Base>()]
        }
    }

    /// 需要三次轮询才能完成启动
    #[derive(Default)]
    struct SlowBase {
        polls: u32,
    }
    impl FeatureDescriptor for SlowBase {}
    impl Submodule for SlowBase {
        fn on_startup(&mut self, _ctx: &mut StartupContext<'_>) -> Poll<Result<()>> {
            self.polls += 1;
            if self.polls < 3 {
                return Poll::Pending;
            }
            log("start:SlowBase");
            Poll::Ready(Ok(()))
        }
        fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
            Some(self)
        }
    }
    impl Tickable for SlowBase {
        fn tick(&mut self, _ctx: &mut TickContext<'_>) {
            log("tick:SlowBase");
        }
    }

    #[derive(Default)]
    struct TopWorker;
    impl FeatureDescriptor for TopWorker {}
    impl Submodule for TopWorker {
        fn on_startup(&mut self, _ctx: &mut StartupContext<'_>) -> Poll<Result<()>> {
            log("start:TopWorker");
            Poll::Ready(Ok(()))
        }
        fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
            Some(self)
        }
    }
    impl Tickable for TopWorker {
        fn tick(&mut self, ctx: &mut TickContext<'_>) {
            log("tick:TopWorker");
            if ctx.cycle() == 3 {
                ctx.remove_module("Top");
            }
        }
    }

    fn runner() -> Runner {
        let mut catalog = FeatureCatalog::new();
        catalog
            .register_module::<Base>()
            .register_submodule::<Base, SlowBase>()
            .register_module::<Top>()
            .register_submodule::<Top, TopWorker>();
        let catalog = catalog.into_shared();

        let mut modules = ModuleProfile::new(Arc::clone(&catalog));
        modules
            .add(FeatureModule::with_catalog_defaults(TypeKey::of::<Top>(), &catalog), false)
            .unwrap();
        modules
            .add(FeatureModule::with_catalog_defaults(TypeKey::of::<Base>(), &catalog), false)
            .unwrap();
        Runner::new(modules, ComponentProfile::new())
    }

    #[test]
    fn test_async_startup_keeps_dependency_order() {
        take_log();
        let mut runner = runner();
        runner.enable();

        // SlowBase 未完成，TopWorker 被推迟排队
        assert_eq!(runner.pending_startups(), 2);
        assert!(take_log().is_empty());
        assert!(runner.tickables().is_empty());

        runner.update_with_delta(Duration::from_millis(16));
        assert_eq!(
            take_log(),
            vec!["start:SlowBase", "start:TopWorker", "tick:SlowBase", "tick:TopWorker"]
        );
        assert_eq!(runner.pending_startups(), 0);
    }

    #[test]
    fn test_tick_commands_apply_next_cycle() {
        take_log();
        let mut runner = runner();
        runner.enable();
        runner.update_with_delta(Duration::from_millis(16));
        runner.update_with_delta(Duration::from_millis(16));
        runner.update_with_delta(Duration::from_millis(16));
        take_log();

        // 第三帧请求移除 Top，第四帧生效
        assert!(runner.running_modules().contains(&TypeKey::of::<Top>()));
        runner.update_with_delta(Duration::from_millis(16));
        assert!(!runner.running_modules().contains(&TypeKey::of::<Top>()));
        assert_eq!(take_log(), vec!["tick:SlowBase"]);
    }

    #[test]
    fn test_disable_is_reversible() {
        take_log();
        let mut runner = runner();
        runner.enable();
        runner.update_with_delta(Duration::ZERO);
        runner.disable();
        assert!(!runner.is_running());
        assert!(runner.all_submodules().is_empty());

        take_log();
        runner.enable();
        runner.update_with_delta(Duration::ZERO);
        assert_eq!(runner.tickables().len(), 2);
        assert_eq!(runner.cycle(), 1);
    }
}
