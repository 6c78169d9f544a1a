//! 运行器性能采样
//!
//! 运行器在每个阶段（启动、逐帧分发、绘制、关闭、重建）外包一个采样器，
//! 记录调用次数、最近一次、最大值与累计耗时，可导出为 JSON 报告。
//!
//! ```rust
//! use features_core::utils::metrics::{Phase, RunnerMetrics};
//!
//! let mut metrics = RunnerMetrics::new();
//! let sample = metrics.begin(Phase::Tick);
//! // ... 分发 tick ...
//! metrics.end(sample);
//!
//! let report = metrics.export();
//! assert_eq!(report.phase(Phase::Tick).map(|p| p.count), Some(1));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

// ============================================================================
// 阶段定义
// ============================================================================

/// 运行器的采样阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// 模块与子模块启动
    Startup,
    /// 逐帧分发
    Tick,
    /// GUI 绘制分发
    DrawGui,
    /// 调试图形绘制分发
    DrawGizmos,
    /// 关闭
    Shutdown,
    /// 完整重建
    Rebuild,
}

impl Phase {
    /// 所有阶段
    pub const ALL: [Phase; 6] = [
        Phase::Startup,
        Phase::Tick,
        Phase::DrawGui,
        Phase::DrawGizmos,
        Phase::Shutdown,
        Phase::Rebuild,
    ];

    fn index(self) -> usize {
        match self {
            Phase::Startup => 0,
            Phase::Tick => 1,
            Phase::DrawGui => 2,
            Phase::DrawGizmos => 3,
            Phase::Shutdown => 4,
            Phase::Rebuild => 5,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Startup => "startup",
            Phase::Tick => "tick",
            Phase::DrawGui => "draw_gui",
            Phase::DrawGizmos => "draw_gizmos",
            Phase::Shutdown => "shutdown",
            Phase::Rebuild => "rebuild",
        };
        f.write_str(name)
    }
}

// ============================================================================
// 统计
// ============================================================================

/// 单个阶段的累计统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    /// 采样次数
    pub count: u64,
    /// 最近一次耗时（微秒）
    pub last_us: u64,
    /// 最大耗时（微秒）
    pub max_us: u64,
    /// 累计耗时（微秒）
    pub total_us: u64,
}

impl PhaseStats {
    fn record(&mut self, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        self.count += 1;
        self.last_us = us;
        self.max_us = self.max_us.max(us);
        self.total_us = self.total_us.saturating_add(us);
    }

    /// 平均耗时（微秒）
    pub fn average_us(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_us / self.count
        }
    }
}

/// 进行中的采样
#[must_use = "采样需要交还给 RunnerMetrics::end"]
#[derive(Debug)]
pub struct Sample {
    phase: Phase,
    started: Instant,
}

/// 运行器性能采样器
///
/// 运行器在单线程中驱动，因此不使用原子计数。
#[derive(Debug, Clone)]
pub struct RunnerMetrics {
    phases: [PhaseStats; 6],
    since: DateTime<Utc>,
}

impl RunnerMetrics {
    /// 创建采样器
    pub fn new() -> Self {
        Self {
            phases: [PhaseStats::default(); 6],
            since: Utc::now(),
        }
    }

    /// 开始采样
    pub fn begin(&self, phase: Phase) -> Sample {
        Sample {
            phase,
            started: Instant::now(),
        }
    }

    /// 结束采样并记录
    pub fn end(&mut self, sample: Sample) {
        self.record(sample.phase, sample.started.elapsed());
    }

    /// 直接记录一次耗时
    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        self.phases[phase.index()].record(elapsed);
    }

    /// 查询某阶段统计
    pub fn stats(&self, phase: Phase) -> PhaseStats {
        self.phases[phase.index()]
    }

    /// 清空统计
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// 导出报告
    pub fn export(&self) -> MetricsReport {
        MetricsReport {
            since: self.since,
            generated_at: Utc::now(),
            phases: Phase::ALL
                .iter()
                .map(|&phase| PhaseReport {
                    phase,
                    count: self.stats(phase).count,
                    last_us: self.stats(phase).last_us,
                    max_us: self.stats(phase).max_us,
                    average_us: self.stats(phase).average_us(),
                })
                .collect(),
        }
    }
}

impl Default for RunnerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 报告
// ============================================================================

/// 阶段报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    /// 阶段
    pub phase: Phase,
    /// 采样次数
    pub count: u64,
    /// 最近一次（微秒）
    pub last_us: u64,
    /// 最大（微秒）
    pub max_us: u64,
    /// 平均（微秒）
    pub average_us: u64,
}

/// 性能报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    /// 统计起点
    pub since: DateTime<Utc>,
    /// 生成时间
    pub generated_at: DateTime<Utc>,
    /// 各阶段数据
    pub phases: Vec<PhaseReport>,
}

impl MetricsReport {
    /// 查找某阶段
    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    /// 导出为 JSON 字符串
    pub fn to_json(&self) -> crate::utils::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
