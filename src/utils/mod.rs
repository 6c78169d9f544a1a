//! 工具模块
//!
//! 错误类型、订阅 ID、日志系统、性能采样。

pub mod error;
pub mod id;
pub mod logger;
pub mod metrics;

pub use error::{error_code, CoreError, Result};
pub use id::{generate_id, SubscriptionId};
pub use logger::{fields, LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use metrics::{MetricsReport, Phase, PhaseStats, RunnerMetrics};
