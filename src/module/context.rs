//! 帧上下文
//!
//! - [`FrameClock`] 生成每帧的时间信息
//! - [`TickContext`] 在分发期间传给 Tickable 子模块，携带帧信息与延迟命令缓冲
//! - [`StartupContext`] 在启动轮询期间传给子模块

use std::time::{Duration, Instant};

use crate::core::parameters::ParameterStore;

// ============================================================================
// 帧信息
// ============================================================================

/// 单帧时间信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// 距上一帧的时间
    pub delta: Duration,
    /// 启用以来的累计时间
    pub elapsed: Duration,
    /// 帧序号，第一帧为 1
    pub cycle: u64,
}

impl FrameInfo {
    /// 帧间隔（秒）
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

/// 帧时钟
#[derive(Debug, Default)]
pub struct FrameClock {
    last: Option<Instant>,
    elapsed: Duration,
    cycle: u64,
}

impl FrameClock {
    /// 创建时钟
    pub fn new() -> Self {
        Self::default()
    }

    /// 测量距上次测量的真实时间，第一次返回零
    pub fn measure(&mut self) -> Duration {
        let now = Instant::now();
        let delta = self
            .last
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.last = Some(now);
        delta
    }

    /// 推进一帧
    pub fn advance(&mut self, delta: Duration) -> FrameInfo {
        self.cycle += 1;
        self.elapsed += delta;
        FrameInfo {
            delta,
            elapsed: self.elapsed,
            cycle: self.cycle,
        }
    }

    /// 当前帧序号
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// 重置
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// 延迟命令
// ============================================================================

/// 分发期间由子模块发出的请求，在本帧分发结束后转交运行器
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerCommand {
    /// 按菜单路径添加模块
    AddModule(String),
    /// 按菜单路径移除模块
    RemoveModule(String),
    /// 按菜单路径设置激活状态
    SetModuleActive(String, bool),
}

/// Tick 上下文
pub struct TickContext<'a> {
    frame: FrameInfo,
    commands: &'a mut Vec<RunnerCommand>,
}

impl<'a> TickContext<'a> {
    pub(crate) fn new(frame: FrameInfo, commands: &'a mut Vec<RunnerCommand>) -> Self {
        Self { frame, commands }
    }

    /// 帧信息
    pub fn frame(&self) -> FrameInfo {
        self.frame
    }

    /// 距上一帧的时间
    pub fn delta(&self) -> Duration {
        self.frame.delta
    }

    /// 累计时间
    pub fn elapsed(&self) -> Duration {
        self.frame.elapsed
    }

    /// 帧序号
    pub fn cycle(&self) -> u64 {
        self.frame.cycle
    }

    /// 请求添加模块（下一帧生效）
    pub fn add_module(&mut self, menu_path: impl Into<String>) {
        self.commands.push(RunnerCommand::AddModule(menu_path.into()));
    }

    /// 请求移除模块（下一帧生效）
    pub fn remove_module(&mut self, menu_path: impl Into<String>) {
        self.commands
            .push(RunnerCommand::RemoveModule(menu_path.into()));
    }

    /// 请求设置模块激活状态（下一帧生效）
    pub fn set_module_active(&mut self, menu_path: impl Into<String>, active: bool) {
        self.commands
            .push(RunnerCommand::SetModuleActive(menu_path.into(), active));
    }
}

// ============================================================================
// 启动上下文
// ============================================================================

/// 启动上下文
pub struct StartupContext<'a> {
    attempt: u32,
    parameters: &'a ParameterStore,
}

impl<'a> StartupContext<'a> {
    pub(crate) fn new(attempt: u32, parameters: &'a ParameterStore) -> Self {
        Self {
            attempt,
            parameters,
        }
    }

    /// 本次启动流程中的第几次轮询，从 0 开始
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// 参数存储
    pub fn parameters(&self) -> &ParameterStore {
        self.parameters
    }
}
