//! 核心模块
//!
//! 内核配置与参数存储。

pub mod config;
pub mod parameters;

pub use config::{
    ComponentRecord, CoreConfig, CoreConfigBuilder, LogConfig, ModuleRecord, ProfileConfig,
    RunnerConfig,
};
pub use parameters::ParameterStore;
