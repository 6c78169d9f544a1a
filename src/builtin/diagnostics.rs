//! 诊断功能
//!
//! [`FrameStats`] 统计帧间隔并按设置周期输出日志。它依赖计时器功能，
//! 绑定 [`DiagnosticsSettings`] 组件，启动前从参数存储读取预热帧数，
//! 并在预热期间保持启动中状态。

use std::task::Poll;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::timer::TimerFeature;
use crate::core::parameters::ParameterStore;
use crate::module::{
    Component, ComponentBound, ComponentSlot, Drawable, FeatureDescriptor, Preparable,
    SharedComponent, StartupContext, Submodule, TickContext, Tickable, TypeKey,
};
use crate::utils::Result;

/// 预热帧数的参数键
pub const WARMUP_CYCLES_KEY: &str = "diagnostics.warmup_cycles";

/// 诊断功能模块
pub struct DiagnosticsFeature;

impl FeatureDescriptor for DiagnosticsFeature {
    const MENU_PATH: Option<&'static str> = Some("Debug/Diagnostics");
    const DESCRIPTION: Option<&'static str> = Some("帧统计与周期报告");

    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<TimerFeature>()]
    }
}

/// 诊断设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsSettings {
    /// 每隔多少帧输出一次报告，0 表示不输出
    #[serde(default = "default_report_every")]
    pub report_every: u64,

    /// 报告标签
    #[serde(default = "default_label")]
    pub label: String,
}

fn default_report_every() -> u64 {
    60
}

fn default_label() -> String {
    "frame".to_string()
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            report_every: default_report_every(),
            label: default_label(),
        }
    }
}

impl FeatureDescriptor for DiagnosticsSettings {}
impl Component for DiagnosticsSettings {}

/// 帧统计子模块
#[derive(Debug, Default)]
pub struct FrameStats {
    settings: ComponentSlot<DiagnosticsSettings>,
    warmup_cycles: u32,
    frames: u64,
    total: Duration,
    max_delta: Duration,
    gui_draws: u64,
}

impl FrameStats {
    /// 已统计的帧数
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// 平均帧间隔
    pub fn average_delta(&self) -> Duration {
        if self.frames == 0 {
            return Duration::ZERO;
        }
        self.total / self.frames as u32
    }

    /// 最大帧间隔
    pub fn max_delta(&self) -> Duration {
        self.max_delta
    }

    /// GUI 绘制次数
    pub fn gui_draws(&self) -> u64 {
        self.gui_draws
    }

    /// 预热帧数
    pub fn warmup_cycles(&self) -> u32 {
        self.warmup_cycles
    }

    /// 已绑定的设置
    pub fn settings(&self) -> Option<&DiagnosticsSettings> {
        self.settings.get()
    }
}

impl FeatureDescriptor for FrameStats {
    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<TimerFeature>()]
    }
}

impl Submodule for FrameStats {
    fn on_startup(&mut self, ctx: &mut StartupContext<'_>) -> Poll<Result<()>> {
        if ctx.attempt() < self.warmup_cycles {
            return Poll::Pending;
        }
        debug!(warmup = self.warmup_cycles, "帧统计已就绪");
        Poll::Ready(Ok(()))
    }

    fn on_shutdown(&mut self) {
        self.frames = 0;
        self.total = Duration::ZERO;
        self.max_delta = Duration::ZERO;
        self.gui_draws = 0;
    }

    fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
        Some(self)
    }

    fn as_component_bound(&mut self) -> Option<&mut dyn ComponentBound> {
        Some(self)
    }

    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        Some(self)
    }

    fn as_preparable(&mut self) -> Option<&mut dyn Preparable> {
        Some(self)
    }
}

impl Tickable for FrameStats {
    fn tick(&mut self, ctx: &mut TickContext<'_>) {
        let delta = ctx.delta();
        self.frames += 1;
        self.total += delta;
        self.max_delta = self.max_delta.max(delta);

        let (every, label) = match self.settings.get() {
            Some(s) => (s.report_every, s.label.as_str()),
            None => (default_report_every(), "frame"),
        };
        if every > 0 && self.frames % every == 0 {
            info!(
                label = %label,
                cycle = ctx.cycle(),
                frames = self.frames,
                avg_ms = self.average_delta().as_secs_f64() * 1000.0,
                max_ms = self.max_delta.as_secs_f64() * 1000.0,
                "帧统计"
            );
        }
    }
}

impl ComponentBound for FrameStats {
    fn component_type(&self) -> TypeKey {
        self.settings.component_type()
    }

    fn component(&self) -> Option<&SharedComponent> {
        self.settings.shared()
    }

    fn bind_component(&mut self, component: SharedComponent) {
        self.settings.bind(component);
    }
}

impl Drawable for FrameStats {
    fn draw_gui(&mut self) {
        self.gui_draws += 1;
    }
}

impl Preparable for FrameStats {
    fn prepare(&mut self, parameters: &ParameterStore) -> Result<()> {
        self.warmup_cycles = parameters.get_or(WARMUP_CYCLES_KEY, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ComponentProfile, StartupProgress, SubmoduleSlot};

    #[test]
    fn test_warmup_keeps_startup_pending() {
        let mut params = ParameterStore::new();
        params.set(WARMUP_CYCLES_KEY, 2).unwrap();

        let mut slot = SubmoduleSlot::of(FrameStats::default());
        assert_eq!(slot.startup(&params), StartupProgress::Pending);
        assert_eq!(slot.resume_startup(&params), StartupProgress::Pending);
        assert_eq!(slot.resume_startup(&params), StartupProgress::Complete);
        assert_eq!(slot.downcast_ref::<FrameStats>().unwrap().warmup_cycles(), 2);
    }

    #[test]
    fn test_binds_settings() {
        let mut components = ComponentProfile::new();
        components
            .add(DiagnosticsSettings {
                report_every: 5,
                label: "bench".into(),
            })
            .unwrap();

        let mut slot = SubmoduleSlot::of(FrameStats::default());
        assert!(slot.bind_component(&components));
        let stats = slot.downcast_ref::<FrameStats>().unwrap();
        assert_eq!(stats.settings().unwrap().label, "bench");
    }

    #[test]
    fn test_settings_defaults() {
        let settings: DiagnosticsSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, DiagnosticsSettings::default());
    }
}
