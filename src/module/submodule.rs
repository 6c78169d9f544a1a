//! 子模块契约与生命周期槽位
//!
//! 子模块是模块内部真正承载行为的单元。它可以选择实现以下能力：
//!
//! - [`Tickable`]：每帧接收一次 [`TickContext`]
//! - [`ComponentBound`]：需要运行器在启动前绑定一个外部组件
//! - [`Drawable`]：GUI / 调试图形绘制钩子
//! - [`Preparable`]：启动前从参数存储拉取配置
//!
//! 启动允许协作式异步：`on_startup` 返回 `Poll::Pending` 表示尚未就绪，
//! 运行器会在后续帧中继续轮询，直到返回 `Poll::Ready`。
//!
//! [`SubmoduleSlot`] 包裹子模块实例，负责状态守卫：重复启动、重复关闭都是空操作。

use std::any::Any;
use std::fmt;
use std::task::Poll;

use tracing::{debug, error, warn};

use crate::core::parameters::ParameterStore;
use crate::module::component::{ComponentProfile, SharedComponent};
use crate::module::context::{StartupContext, TickContext};
use crate::module::metadata::TypeKey;
use crate::utils::Result;

// ============================================================================
// 子模块契约
// ============================================================================

/// 类型擦除辅助，对所有 `'static` 类型自动实现
pub trait AsAny: Any {
    /// 以 `&dyn Any` 访问
    fn as_any(&self) -> &dyn Any;
    /// 以 `&mut dyn Any` 访问
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// 子模块
pub trait Submodule: AsAny + Send {
    /// 启动步骤；返回 `Poll::Pending` 让出控制，下一帧再次被调用
    fn on_startup(&mut self, _ctx: &mut StartupContext<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    /// 关闭步骤
    fn on_shutdown(&mut self) {}

    /// Tickable 能力
    fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
        None
    }

    /// ComponentBound 能力
    fn as_component_bound(&mut self) -> Option<&mut dyn ComponentBound> {
        None
    }

    /// Drawable 能力
    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        None
    }

    /// Preparable 能力
    fn as_preparable(&mut self) -> Option<&mut dyn Preparable> {
        None
    }
}

/// 每帧接收上下文
pub trait Tickable {
    /// 每帧调用一次
    fn tick(&mut self, ctx: &mut TickContext<'_>);
}

/// 绑定外部组件
pub trait ComponentBound {
    /// 需要的组件类型
    fn component_type(&self) -> TypeKey;
    /// 当前绑定的组件
    fn component(&self) -> Option<&SharedComponent>;
    /// 由运行器在启动前调用
    fn bind_component(&mut self, component: SharedComponent);
}

/// 绘制钩子
pub trait Drawable {
    /// GUI 绘制
    fn draw_gui(&mut self) {}
    /// 调试图形绘制
    fn draw_gizmos(&mut self) {}
}

/// 启动前读取参数
pub trait Preparable {
    /// 拉取配置
    fn prepare(&mut self, parameters: &ParameterStore) -> Result<()>;
}

// ============================================================================
// 生命周期槽位
// ============================================================================

/// 子模块状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmoduleState {
    /// 尚未启动
    Uninitialized,
    /// 启动中（可能在等待异步步骤）
    Starting,
    /// 已启动
    Started,
    /// 关闭中
    ShuttingDown,
    /// 已关闭，可再次启动
    Shutdown,
    /// 启动失败，可再次启动
    Failed,
}

/// 启动推进结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupProgress {
    /// 已完成
    Complete,
    /// 尚未完成，需要继续轮询
    Pending,
    /// 启动失败
    Failed,
    /// 未执行（子模块已禁用或已被移除）
    Skipped,
}

/// 子模块具备的能力
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// 可 tick
    pub tickable: bool,
    /// 绑定组件
    pub component_bound: bool,
    /// 可绘制
    pub drawable: bool,
    /// 启动前读取参数
    pub preparable: bool,
}

/// 子模块槽位
pub struct SubmoduleSlot {
    key: TypeKey,
    inner: Box<dyn Submodule>,
    enabled: bool,
    state: SubmoduleState,
    capabilities: Capabilities,
    attempts: u32,
}

impl SubmoduleSlot {
    /// 包装一个子模块实例
    pub fn new(key: TypeKey, mut inner: Box<dyn Submodule>) -> Self {
        let capabilities = Capabilities {
            tickable: inner.as_tickable().is_some(),
            component_bound: inner.as_component_bound().is_some(),
            drawable: inner.as_drawable().is_some(),
            preparable: inner.as_preparable().is_some(),
        };
        Self {
            key,
            inner,
            enabled: true,
            state: SubmoduleState::Uninitialized,
            capabilities,
            attempts: 0,
        }
    }

    /// 以具体类型包装
    pub fn of<S: Submodule>(submodule: S) -> Self {
        Self::new(TypeKey::of::<S>(), Box::new(submodule))
    }

    /// 子模块类型
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// 是否启用
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 设置启用标记；实际的启动/关闭由运行器在下一帧检测到变化后执行
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// 当前状态
    pub fn state(&self) -> SubmoduleState {
        self.state
    }

    /// 是否已完成启动
    pub fn is_started(&self) -> bool {
        self.state == SubmoduleState::Started
    }

    /// 能力
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// 开始启动
    ///
    /// 已在启动中或已启动时为空操作。Preparable 子模块先读取参数，
    /// 然后执行第一次启动轮询。
    pub fn startup(&mut self, parameters: &ParameterStore) -> StartupProgress {
        match self.state {
            SubmoduleState::Starting | SubmoduleState::ShuttingDown => {
                return StartupProgress::Pending
            }
            SubmoduleState::Started => return StartupProgress::Complete,
            _ => {}
        }

        self.state = SubmoduleState::Starting;
        self.attempts = 0;

        if let Some(preparable) = self.inner.as_preparable() {
            if let Err(e) = preparable.prepare(parameters) {
                error!(submodule = %self.key, error = %e, "子模块读取参数失败");
                self.state = SubmoduleState::Failed;
                return StartupProgress::Failed;
            }
        }

        self.poll_startup(parameters)
    }

    /// 继续推进启动中的子模块
    pub fn resume_startup(&mut self, parameters: &ParameterStore) -> StartupProgress {
        match self.state {
            SubmoduleState::Starting => self.poll_startup(parameters),
            SubmoduleState::Started => StartupProgress::Complete,
            SubmoduleState::Failed => StartupProgress::Failed,
            _ => StartupProgress::Skipped,
        }
    }

    fn poll_startup(&mut self, parameters: &ParameterStore) -> StartupProgress {
        let mut ctx = StartupContext::new(self.attempts, parameters);
        self.attempts = self.attempts.saturating_add(1);

        match self.inner.on_startup(&mut ctx) {
            Poll::Pending => StartupProgress::Pending,
            Poll::Ready(Ok(())) => {
                self.state = SubmoduleState::Started;
                debug!(submodule = %self.key, polls = self.attempts, "子模块启动完成");
                StartupProgress::Complete
            }
            Poll::Ready(Err(e)) => {
                self.state = SubmoduleState::Failed;
                error!(submodule = %self.key, error = %e, "子模块启动失败");
                StartupProgress::Failed
            }
        }
    }

    /// 关闭子模块
    ///
    /// 只对启动中或已启动的子模块执行关闭步骤，返回是否真正执行了关闭。
    /// 启动中的子模块会在未完成初始化的状态下被关闭。
    pub fn shutdown(&mut self) -> bool {
        match self.state {
            SubmoduleState::Starting | SubmoduleState::Started => {}
            _ => return false,
        }

        self.state = SubmoduleState::ShuttingDown;
        self.inner.on_shutdown();
        self.state = SubmoduleState::Shutdown;
        debug!(submodule = %self.key, "子模块已关闭");
        true
    }

    /// 为 ComponentBound 子模块绑定组件，返回是否绑定成功
    pub fn bind_component(&mut self, components: &ComponentProfile) -> bool {
        let Some(bound) = self.inner.as_component_bound() else {
            return false;
        };

        let wanted = bound.component_type();
        match components.get(wanted) {
            Some(component) => {
                bound.bind_component(component.clone());
                true
            }
            None => {
                warn!(
                    submodule = %self.key,
                    component = %wanted,
                    "组件列表中没有所需组件，跳过绑定"
                );
                false
            }
        }
    }

    /// 分发一帧；只有已启用且已启动的子模块会被调用
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) {
        if !self.enabled || self.state != SubmoduleState::Started {
            return;
        }
        if let Some(tickable) = self.inner.as_tickable() {
            tickable.tick(ctx);
        }
    }

    /// GUI 绘制
    pub fn draw_gui(&mut self) {
        if let Some(drawable) = self.drawable() {
            drawable.draw_gui();
        }
    }

    /// 调试图形绘制
    pub fn draw_gizmos(&mut self) {
        if let Some(drawable) = self.drawable() {
            drawable.draw_gizmos();
        }
    }

    fn drawable(&mut self) -> Option<&mut dyn Drawable> {
        if !self.enabled || self.state != SubmoduleState::Started {
            return None;
        }
        self.inner.as_drawable()
    }

    /// 子模块实例
    pub fn submodule(&self) -> &dyn Submodule {
        self.inner.as_ref()
    }

    /// 子模块实例（可变）
    pub fn submodule_mut(&mut self) -> &mut dyn Submodule {
        self.inner.as_mut()
    }

    /// 转为具体类型
    pub fn downcast_ref<S: Submodule>(&self) -> Option<&S> {
        self.inner.as_ref().as_any().downcast_ref::<S>()
    }

    /// 转为具体类型（可变）
    pub fn downcast_mut<S: Submodule>(&mut self) -> Option<&mut S> {
        self.inner.as_mut().as_any_mut().downcast_mut::<S>()
    }
}

impl fmt::Debug for SubmoduleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmoduleSlot")
            .field("key", &self.key)
            .field("enabled", &self.enabled)
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::component::{Component, ComponentSlot};
    use crate::module::context::FrameInfo;
    use std::sync::Arc;

    #[derive(Default)]
    struct Counter {
        startups: u32,
        shutdowns: u32,
        ticks: u32,
    }

    impl Submodule for Counter {
        fn on_startup(&mut self, _ctx: &mut StartupContext<'_>) -> Poll<Result<()>> {
            self.startups += 1;
            Poll::Ready(Ok(()))
        }

        fn on_shutdown(&mut self) {
            self.shutdowns += 1;
        }

        fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
            Some(self)
        }
    }

    impl Tickable for Counter {
        fn tick(&mut self, _ctx: &mut TickContext<'_>) {
            self.ticks += 1;
        }
    }

    /// 需要轮询三次才完成启动
    #[derive(Default)]
    struct Staged {
        polls: u32,
    }

    impl Submodule for Staged {
        fn on_startup(&mut self, ctx: &mut StartupContext<'_>) -> Poll<Result<()>> {
            self.polls += 1;
            if ctx.attempt() < 2 {
                Poll::Pending
            } else {
                Poll::Ready(Ok(()))
            }
        }
    }

    struct Broken;

    impl Submodule for Broken {
        fn on_startup(&mut self, _ctx: &mut StartupContext<'_>) -> Poll<Result<()>> {
            Poll::Ready(Err(anyhow::anyhow!("设备不可用").into()))
        }
    }

    #[derive(Debug)]
    struct Palette;
    impl Component for Palette {}

    #[derive(Default)]
    struct Painter {
        palette: ComponentSlot<Palette>,
    }

    impl Submodule for Painter {
        fn as_component_bound(&mut self) -> Option<&mut dyn ComponentBound> {
            Some(self)
        }
    }

    impl ComponentBound for Painter {
        fn component_type(&self) -> TypeKey {
            self.palette.component_type()
        }
        fn component(&self) -> Option<&SharedComponent> {
            self.palette.shared()
        }
        fn bind_component(&mut self, component: SharedComponent) {
            self.palette.bind(component);
        }
    }

    #[test]
    fn test_startup_and_shutdown_are_idempotent() {
        let params = ParameterStore::new();
        let mut slot = SubmoduleSlot::of(Counter::default());
        assert_eq!(slot.state(), SubmoduleState::Uninitialized);

        assert_eq!(slot.startup(&params), StartupProgress::Complete);
        assert_eq!(slot.startup(&params), StartupProgress::Complete);
        assert_eq!(slot.downcast_ref::<Counter>().unwrap().startups, 1);

        assert!(slot.shutdown());
        assert!(!slot.shutdown());
        assert_eq!(slot.downcast_ref::<Counter>().unwrap().shutdowns, 1);
        assert_eq!(slot.state(), SubmoduleState::Shutdown);

        // 关闭后允许再次启动
        assert_eq!(slot.startup(&params), StartupProgress::Complete);
        assert_eq!(slot.downcast_ref::<Counter>().unwrap().startups, 2);
    }

    #[test]
    fn test_shutdown_before_startup_is_noop() {
        let mut slot = SubmoduleSlot::of(Counter::default());
        assert!(!slot.shutdown());
        assert_eq!(slot.downcast_ref::<Counter>().unwrap().shutdowns, 0);
    }

    #[test]
    fn test_staged_startup_requires_resume() {
        let params = ParameterStore::new();
        let mut slot = SubmoduleSlot::of(Staged::default());

        assert_eq!(slot.startup(&params), StartupProgress::Pending);
        // 启动中再次 startup 不会重新开始
        assert_eq!(slot.startup(&params), StartupProgress::Pending);
        assert_eq!(slot.downcast_ref::<Staged>().unwrap().polls, 1);

        assert_eq!(slot.resume_startup(&params), StartupProgress::Pending);
        assert_eq!(slot.resume_startup(&params), StartupProgress::Complete);
        assert!(slot.is_started());
        assert_eq!(slot.downcast_ref::<Staged>().unwrap().polls, 3);
    }

    #[test]
    fn test_failed_startup() {
        let params = ParameterStore::new();
        let mut slot = SubmoduleSlot::of(Broken);
        assert_eq!(slot.startup(&params), StartupProgress::Failed);
        assert_eq!(slot.state(), SubmoduleState::Failed);
        assert!(!slot.shutdown());
    }

    #[test]
    fn test_tick_requires_started_and_enabled() {
        let params = ParameterStore::new();
        let mut commands = Vec::new();
        let mut slot = SubmoduleSlot::of(Counter::default());
        assert!(slot.capabilities().tickable);

        slot.tick(&mut TickContext::new(FrameInfo::default(), &mut commands));
        slot.startup(&params);
        slot.set_enabled(false);
        slot.tick(&mut TickContext::new(FrameInfo::default(), &mut commands));
        slot.set_enabled(true);
        slot.tick(&mut TickContext::new(FrameInfo::default(), &mut commands));

        assert_eq!(slot.downcast_ref::<Counter>().unwrap().ticks, 1);
    }

    #[test]
    fn test_bind_component() {
        let mut slot = SubmoduleSlot::of(Painter::default());
        assert!(slot.capabilities().component_bound);

        let mut components = ComponentProfile::new();
        assert!(!slot.bind_component(&components));

        components
            .insert(TypeKey::of::<Palette>(), Arc::new(Palette), false)
            .unwrap();
        assert!(slot.bind_component(&components));
        assert!(slot
            .downcast_ref::<Painter>()
            .unwrap()
            .palette
            .get()
            .is_some());
    }
}
