//! 宿主帧循环
//!
//! 以固定间隔驱动访问门面：启用一次，之后每帧 `update` + `draw_gui`，
//! 收到停止信号（或达到帧数上限）后停用。帧回调始终在同一个任务中
//! 串行执行，不会重入。

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::api::features::Features;
use crate::core::config::RunnerConfig;

/// 宿主帧循环
#[derive(Debug, Clone)]
pub struct FrameLoop {
    interval: Duration,
    max_cycles: Option<u64>,
}

impl FrameLoop {
    /// 以帧间隔创建
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_cycles: None,
        }
    }

    /// 使用运行器配置中的帧间隔
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(Duration::from_millis(config.tick_interval_ms.max(1)))
    }

    /// 限制最多运行的帧数
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// 帧间隔
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 运行到 Ctrl+C 或帧数上限，返回执行的帧数
    pub async fn run(&self, features: &mut Features) -> u64 {
        self.run_until(features, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "无法监听 Ctrl+C，仅在达到帧数上限时停止");
                std::future::pending::<()>().await;
            }
            info!("收到停止信号");
        })
        .await
    }

    /// 运行到 `stop` 完成或帧数上限，返回执行的帧数
    pub async fn run_until<F>(&self, features: &mut Features, stop: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(stop);

        info!(interval_ms = self.interval.as_millis() as u64, "帧循环启动");
        features.enable();

        let mut cycles = 0u64;
        loop {
            if self.max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }

            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    features.update();
                    features.draw_gui();
                    cycles += 1;
                }
            }
        }

        features.disable();
        info!(cycles, "帧循环结束");
        cycles
    }
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::from_config(&RunnerConfig::default())
    }
}
